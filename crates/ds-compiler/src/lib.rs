mod expr;
mod lower;
mod statements;

use ds_core::{Program, ScriptError};
use ds_parser::{ScriptLex, Token};

use crate::lower::GraphBuilder;
use crate::statements::TreeBuilder;

/// Compiles script source text into a statement graph.
pub fn compile_source(source: &str) -> Result<Program, ScriptError> {
    let mut lex = ScriptLex::new(source);
    let mut builder = TreeBuilder::new();
    loop {
        let mut tokens = Vec::new();
        if lex.get_statement(&mut tokens)? == 0 {
            break;
        }
        builder.statement(&tokens)?;
    }
    GraphBuilder::new().build(builder.finish()?)
}

/// Compiles already tokenized statements.
pub fn compile_statements(statements: &[Vec<Token>]) -> Result<Program, ScriptError> {
    let mut builder = TreeBuilder::new();
    for tokens in statements {
        builder.statement(tokens)?;
    }
    GraphBuilder::new().build(builder.finish()?)
}

#[cfg(test)]
mod compile_tests {
    use super::*;
    use ds_core::{AssignOperator, ErrorKind, ExprOp, StatementKind};

    fn compile(source: &str) -> Program {
        compile_source(source).expect("compile")
    }

    fn kind(program: &Program, id: usize) -> &StatementKind {
        &program.statements[id].kind
    }

    #[test]
    fn sequence_links_next_pointers() {
        let program = compile("a = 1\nb = 2\nprint a, b\n");
        assert_eq!(program.entry, Some(0));
        assert_eq!(program.statements[0].next, Some(1));
        assert_eq!(program.statements[1].next, Some(2));
        assert_eq!(program.statements[2].next, None);
        assert!(matches!(kind(&program, 2), StatementKind::Print { .. }));
    }

    #[test]
    fn elsif_nests_an_if_inside_else() {
        let program = compile("if a\n x = 1\nelsif b\n x = 2\nelse\n x = 3\nend\ny = 0\n");
        let StatementKind::If {
            then_body,
            else_body: Some(nested),
            ..
        } = kind(&program, 0)
        else {
            panic!("expected if");
        };
        assert_eq!(*then_body, Some(1));
        let StatementKind::If {
            else_body: Some(last),
            ..
        } = kind(&program, *nested)
        else {
            panic!("expected nested if");
        };
        assert_eq!(program.statements[*nested].next, None);
        assert!(matches!(kind(&program, *last), StatementKind::Assign { .. }));
        let after = program.statements[0].next.expect("statement after if");
        assert!(matches!(
            kind(&program, after),
            StatementKind::Assign { path, .. } if path == &vec!["y".to_string()]
        ));
    }

    #[test]
    fn inline_bodies_and_clauses() {
        let program = compile("if x: print 1\nelse: print 2\nwhile True: break\n");
        let StatementKind::If {
            then_body: Some(_),
            else_body: Some(_),
            ..
        } = kind(&program, 0)
        else {
            panic!("expected if/else");
        };
        let next = program.statements[0].next.expect("while");
        assert!(matches!(kind(&program, next), StatementKind::While { body: Some(_), .. }));
    }

    #[test]
    fn try_is_followed_by_its_catch_chain() {
        let program = compile(
            "try\n x = 1\ncatch TypeError, e\n pass\ncatch\n pass\nend\ndone = 1\n",
        );
        let StatementKind::Try { body: Some(_) } = kind(&program, 0) else {
            panic!("expected try");
        };
        let first_catch = program.statements[0].next.expect("first catch");
        let StatementKind::Catch {
            error_kind,
            variable,
            chain_end,
            ..
        } = kind(&program, first_catch)
        else {
            panic!("expected catch");
        };
        assert_eq!(error_kind.as_deref(), Some("TypeError"));
        assert_eq!(variable.as_deref(), Some("e"));
        assert_eq!(program.statements[first_catch].next, Some(*chain_end));
        let after = program.statements[*chain_end].next.expect("after chain");
        assert!(matches!(kind(&program, after), StatementKind::Assign { .. }));
    }

    #[test]
    fn def_collects_defaults_into_a_dictionary() {
        let program = compile("def f(a, b=2): return a + b\n");
        let StatementKind::Def {
            name,
            params,
            defaults,
            body: Some(body),
        } = kind(&program, 0)
        else {
            panic!("expected def");
        };
        assert_eq!(name, "f");
        assert_eq!(params, &vec!["a".to_string(), "b".to_string()]);
        assert_eq!(defaults.ops.last(), Some(&ExprOp::MakeDictionary { count: 1 }));
        assert!(matches!(kind(&program, *body), StatementKind::Return { value: Some(_) }));
    }

    #[test]
    fn element_assignment_packs_indices_with_value() {
        let program = compile("grid[1][2] += 3\nconst limit = 10\nx ?= 1\n");
        let StatementKind::Assign {
            path,
            operator,
            indices,
            value,
            constant,
        } = kind(&program, 0)
        else {
            panic!("expected assign");
        };
        assert_eq!(path, &vec!["grid".to_string()]);
        assert_eq!(*operator, AssignOperator::Add);
        assert_eq!(*indices, 2);
        assert!(!constant);
        assert_eq!(value.ops.last(), Some(&ExprOp::MakeArray { count: 3 }));
        assert!(matches!(kind(&program, 1), StatementKind::Assign { constant: true, .. }));
        assert!(matches!(
            kind(&program, 2),
            StatementKind::Assign {
                operator: AssignOperator::Weak,
                ..
            }
        ));
    }

    #[test]
    fn break_accepts_a_level_count() {
        let program = compile("while 1\n while 1\n  break 2\n end\nend\n");
        assert!(program
            .statements
            .iter()
            .any(|statement| statement.kind == StatementKind::Break { count: 2 }));
    }

    #[test]
    fn structural_errors_are_syntax_errors() {
        for source in [
            "if x\n print 1\n",
            "end\n",
            "else\n",
            "try\n pass\nend\n",
            "catch Nonsense\n",
            "break 0\n",
            "x[0] := 1\n",
            "print 1 +\n",
            "def f(a, a)\nend\n",
        ] {
            let error = compile_source(source).expect_err(source);
            assert_eq!(error.kind, ErrorKind::Syntax, "{}", source);
            assert!(error.span.is_some(), "{}", source);
        }
    }
}
