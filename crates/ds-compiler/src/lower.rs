use ds_core::{
    ErrorKind, Program, ScriptError, SourceSpan, Statement, StatementId, StatementKind,
};

use crate::statements::{Branch, CatchClause, Node};

/// Lays a statement tree out as a graph where each statement only knows its
/// successor. Compound statements refer to the entry of their bodies.
#[derive(Debug, Default)]
pub(crate) struct GraphBuilder {
    statements: Vec<Statement>,
}

impl GraphBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn build(mut self, nodes: Vec<Node>) -> Result<Program, ScriptError> {
        let entry = self.block(nodes)?;
        Ok(Program {
            statements: self.statements,
            entry,
        })
    }

    fn push(&mut self, kind: StatementKind, location: SourceSpan) -> StatementId {
        self.statements.push(Statement {
            kind,
            next: None,
            location,
        });
        self.statements.len() - 1
    }

    fn set_kind(&mut self, id: StatementId, kind: StatementKind) {
        self.statements[id].kind = kind;
    }

    /// Emits a sequence and returns the id of its first statement.
    fn block(&mut self, nodes: Vec<Node>) -> Result<Option<StatementId>, ScriptError> {
        let mut first = None;
        let mut tail: Option<StatementId> = None;
        for node in nodes {
            let (head, last) = self.node(node)?;
            match tail {
                Some(tail) => self.statements[tail].next = Some(head),
                None => first = Some(head),
            }
            tail = Some(last);
        }
        Ok(first)
    }

    /// Returns the first and the last statement the node occupies in its
    /// sequence.
    fn node(&mut self, node: Node) -> Result<(StatementId, StatementId), ScriptError> {
        match node {
            Node::Simple { kind, span } => {
                let id = self.push(kind, span);
                Ok((id, id))
            }
            Node::If {
                branches,
                else_body,
                span,
            } => {
                let id = self.if_chain(branches, else_body, span)?;
                Ok((id, id))
            }
            Node::While {
                condition,
                body,
                span,
            } => {
                let id = self.push(StatementKind::Pass, span);
                let body = self.block(body)?;
                self.set_kind(id, StatementKind::While { condition, body });
                Ok((id, id))
            }
            Node::For {
                variable,
                iterable,
                body,
                span,
            } => {
                let id = self.push(StatementKind::Pass, span);
                let body = self.block(body)?;
                self.set_kind(
                    id,
                    StatementKind::For {
                        variable,
                        iterable,
                        body,
                    },
                );
                Ok((id, id))
            }
            Node::Def {
                name,
                params,
                defaults,
                body,
                span,
            } => {
                let id = self.push(StatementKind::Pass, span);
                let body = self.block(body)?;
                self.set_kind(
                    id,
                    StatementKind::Def {
                        name,
                        params,
                        defaults,
                        body,
                    },
                );
                Ok((id, id))
            }
            Node::Try {
                body,
                catches,
                span,
            } => self.try_chain(body, catches, span),
        }
    }

    /// An `elsif` becomes an `if` that is the only statement of the else body.
    fn if_chain(
        &mut self,
        mut branches: Vec<Branch>,
        else_body: Option<Vec<Node>>,
        span: SourceSpan,
    ) -> Result<StatementId, ScriptError> {
        if branches.is_empty() {
            return Err(ScriptError::with_span(ErrorKind::Syntax, "'if' without a condition.", span));
        }
        let first = branches.remove(0);
        let id = self.push(StatementKind::Pass, span);
        let then_body = self.block(first.body)?;
        let else_body = if branches.is_empty() {
            match else_body {
                Some(nodes) => self.block(nodes)?,
                None => None,
            }
        } else {
            let nested_span = branches[0].span.clone();
            let nested = self.if_chain(branches, else_body, nested_span)?;
            Some(nested)
        };
        self.set_kind(
            id,
            StatementKind::If {
                condition: first.condition,
                then_body,
                else_body,
            },
        );
        Ok(id)
    }

    /// The try statement is followed by its catches; every catch records the
    /// last catch of the chain so control can skip the rest after a handler.
    fn try_chain(
        &mut self,
        body: Vec<Node>,
        catches: Vec<CatchClause>,
        span: SourceSpan,
    ) -> Result<(StatementId, StatementId), ScriptError> {
        if catches.is_empty() {
            return Err(ScriptError::with_span(
                ErrorKind::Syntax,
                "'try' must be followed by at least one 'catch'.",
                span,
            ));
        }
        let id = self.push(StatementKind::Pass, span);
        let body = self.block(body)?;
        self.set_kind(id, StatementKind::Try { body });

        let catch_ids = catches
            .iter()
            .map(|clause| self.push(StatementKind::Pass, clause.span.clone()))
            .collect::<Vec<_>>();
        let chain_end = catch_ids[catch_ids.len() - 1];
        self.statements[id].next = Some(catch_ids[0]);
        for pair in catch_ids.windows(2) {
            self.statements[pair[0]].next = Some(pair[1]);
        }
        for (clause, catch_id) in catches.into_iter().zip(catch_ids) {
            let body = self.block(clause.body)?;
            self.set_kind(
                catch_id,
                StatementKind::Catch {
                    error_kind: clause.error_kind,
                    variable: clause.variable,
                    body,
                    chain_end,
                },
            );
        }
        Ok((id, chain_end))
    }
}
