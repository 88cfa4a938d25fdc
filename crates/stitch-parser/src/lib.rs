pub mod ast;
pub mod error;
mod parser;

pub use ast::*;
pub use error::ParseError;

use stitch_lexer::lex_str;

/// Parse a Stitch script from a string
pub fn parse(input: &str) -> Result<Module, ParseError> {
    let lines = lex_str(input)?;
    parser::Parser::new(&lines).parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_routine(input: &str) -> std::sync::Arc<RoutineDecl> {
        let module = parse(input).unwrap_or_else(|e| panic!("Failed to parse: {}", e));
        assert_eq!(module.routines.len(), 1);
        module.routines[0].clone()
    }

    #[test]
    fn test_parse_empty() {
        let module = parse("").unwrap();
        assert!(module.routines.is_empty());
    }

    #[test]
    fn test_parse_simple_routine() {
        let routine = only_routine("def add(a, b):\n    c = a + b\n    return c\n");
        assert_eq!(routine.name, "add");
        assert_eq!(routine.params, vec!["a", "b"]);
        assert!(!routine.is_async);
        assert_eq!(routine.body.statements.len(), 2);
        assert_eq!(
            routine.body.statements[1],
            Statement::Return(Some(Expr::Identifier("c".to_string())))
        );
    }

    #[test]
    fn test_parse_async_routine() {
        let routine = only_routine("async def fetch():\n    x = await sleep(1)\n    return x\n");
        assert!(routine.is_async);
        match &routine.body.statements[0] {
            Statement::Assign { value: Expr::Await(inner), .. } => {
                assert!(matches!(**inner, Expr::Call { .. }));
            }
            other => panic!("Expected await assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_await_outside_async_is_rejected() {
        let err = parse("def f():\n    await sleep(1)\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_framework_decorators_are_tagged() {
        let routine = only_routine("@target\n@trace(\"x\")\ndef f():\n    pass\n");
        assert_eq!(routine.decorators.len(), 2);
        assert!(routine.decorators[0].framework);
        assert_eq!(routine.decorators[1].name, "trace");
        assert!(!routine.decorators[1].framework);
        assert_eq!(routine.decorators[1].args, vec![Expr::String("x".to_string())]);
        assert_eq!(routine.line, 3);
    }

    #[test]
    fn test_strip_framework_decorators() {
        let mut module = parse("@patch(\"main\", 2)\n@trace\ndef f():\n    pass\n").unwrap();
        module.strip_framework_decorators();
        let names: Vec<_> = module.routines[0]
            .decorators
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["trace"]);
    }

    #[test]
    fn test_if_elif_else() {
        let routine = only_routine(
            "def sign(x):\n    if x > 0:\n        return 1\n    elif x < 0:\n        return -1\n    else:\n        return 0\n",
        );
        match &routine.body.statements[0] {
            Statement::If { branches, else_block } => {
                assert_eq!(branches.len(), 2);
                assert!(else_block.is_some());
            }
            other => panic!("Expected if statement, got {:?}", other),
        }
    }

    #[test]
    fn test_loops_and_compound_assignment() {
        let routine = only_routine(
            "def total(xs):\n    t = 0\n    for x in xs:\n        if x == 3:\n            continue\n        t += x\n    while t > 10:\n        t -= 10\n        break\n    return t\n",
        );
        assert_eq!(routine.body.statements.len(), 4);
        match &routine.body.statements[1] {
            Statement::ForIn { var, body, .. } => {
                assert_eq!(var, "x");
                assert!(matches!(
                    body.statements[1],
                    Statement::Assign { op: Some(BinaryOp::Add), .. }
                ));
            }
            other => panic!("Expected for loop, got {:?}", other),
        }
    }

    #[test]
    fn test_break_outside_loop_is_rejected() {
        let err = parse("def f():\n    break\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_nested_routine() {
        let routine = only_routine(
            "def outer(c):\n    def inner(c):\n        return c + 7\n\n    c = inner(c)\n    return c\n",
        );
        match &routine.body.statements[0] {
            Statement::Def(inner) => {
                assert_eq!(inner.name, "inner");
                assert_eq!(inner.params, vec!["c"]);
            }
            other => panic!("Expected nested def, got {:?}", other),
        }
        assert_eq!(routine.body.statements.len(), 3);
    }

    #[test]
    fn test_operator_precedence() {
        let routine = only_routine("def f():\n    return 1 + 2 * 3 == 7 and not false\n");
        let Statement::Return(Some(expr)) = &routine.body.statements[0] else {
            panic!("Expected return");
        };
        match expr {
            Expr::Binary { op: BinaryOp::And, left, right } => {
                assert!(matches!(**left, Expr::Binary { op: BinaryOp::Eq, .. }));
                assert!(matches!(**right, Expr::Unary { op: UnaryOp::Not, .. }));
            }
            other => panic!("Expected `and` at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_collections_and_indexing() {
        let routine = only_routine("def f():\n    m = {\"a\": [1, 2,], \"b\": 3}\n    m[\"a\"][0] = 9\n");
        assert!(matches!(
            routine.body.statements[1],
            Statement::Assign { target: AssignTarget::Index { .. }, op: None, .. }
        ));
    }

    #[test]
    fn test_multiple_routines() {
        let module = parse(
            "def helper(x):\n    return x\n\n@target\ndef main():\n    return helper(1)\n",
        )
        .unwrap();
        assert_eq!(module.routines.len(), 2);
        assert!(module.routine("main").is_some());
        assert!(module.routine("missing").is_none());
    }

    #[test]
    fn test_inconsistent_dedent() {
        let err = parse("def f():\n    if true:\n        x = 1\n      y = 2\n").unwrap_err();
        assert_eq!(err, ParseError::Indentation { line: 4 });
    }

    #[test]
    fn test_missing_block() {
        let err = parse("def f():\ndef g():\n    pass\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse("def f():\n    1 = 2\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_lex_error_is_forwarded() {
        let err = parse("def f():\n    x = \"open\n").unwrap_err();
        assert!(matches!(err, ParseError::Lex(_)));
    }
}
