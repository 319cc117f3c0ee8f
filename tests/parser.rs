#[cfg(test)]
mod parser_tests {
    use treelox as lox;

    use lox::ast::{Expr, Stmt};
    use lox::ast_printer::AstPrinter;
    use lox::parser::Parser;
    use lox::scanner::Scanner;
    use lox::token::Token;

    fn tokens(source: &str) -> Vec<Token<'_>> {
        Scanner::new(source.as_bytes())
            .collect::<Result<_, _>>()
            .expect("test source must scan")
    }

    fn printed_expression(source: &str) -> String {
        let tokens = tokens(source);
        let expr = Parser::new(&tokens)
            .parse_expression()
            .expect("test source must parse");

        AstPrinter::print(&expr)
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(printed_expression("1 + 2 * 3"), "(+ 1.0 (* 2.0 3.0))");
        assert_eq!(
            printed_expression("(1 + 2) * 3"),
            "(* (group (+ 1.0 2.0)) 3.0)"
        );
        assert_eq!(printed_expression("-1 - -2"), "(- (- 1.0) (- 2.0))");
        assert_eq!(
            printed_expression("a or b and c"),
            "(or a (and b c))"
        );
        assert_eq!(
            printed_expression("1 < 2 == true"),
            "(== (< 1.0 2.0) true)"
        );
    }

    #[test]
    fn assignment_is_right_associative() {
        assert_eq!(printed_expression("a = b = 3"), "(= a (= b 3.0))");
    }

    #[test]
    fn property_access_and_calls() {
        assert_eq!(
            printed_expression("obj.field.method(1, x)"),
            "(call (. (. obj field) method) 1.0 x)"
        );
        assert_eq!(
            printed_expression("obj.field = this"),
            "(= (. obj field) this)"
        );
        assert_eq!(printed_expression("super.m()"), "(call (super m))");
    }

    #[test]
    fn invalid_assignment_target_is_rejected() {
        let tokens = tokens("1 + 2 = 3");

        let err = Parser::new(&tokens)
            .parse_expression()
            .expect_err("assignment to an rvalue must not parse");

        assert!(err.to_string().contains("Invalid assignment target"));
    }

    #[test]
    fn for_desugars_into_block_and_while() {
        let tokens = tokens("for (var i = 0; i < 3; i = i + 1) print i;");

        let statements = Parser::new(&tokens).parse().unwrap();

        assert_eq!(statements.len(), 1);

        // { var i = 0; while (i < 3) { print i; i = i + 1; } }
        let Stmt::Block(outer) = &statements[0] else {
            panic!("expected the initializer block");
        };

        assert_eq!(outer.len(), 2);
        assert!(matches!(outer[0], Stmt::Var { .. }));

        let Stmt::While { body, .. } = &outer[1] else {
            panic!("expected the desugared while loop");
        };

        let Stmt::Block(inner) = body.as_ref() else {
            panic!("expected the loop body block");
        };

        assert_eq!(inner.len(), 2);
        assert!(matches!(inner[0], Stmt::Print(_)));
        assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
    }

    #[test]
    fn expression_ids_are_unique() {
        let tokens = tokens("a + a + a");

        let expr = Parser::new(&tokens).parse_expression().unwrap();

        fn collect_ids(expr: &Expr<'_>, ids: &mut Vec<usize>) {
            match expr {
                Expr::Variable { id, .. } => ids.push(*id),
                Expr::Binary { left, right, .. } => {
                    collect_ids(left, ids);
                    collect_ids(right, ids);
                }
                _ => {}
            }
        }

        let mut ids = Vec::new();
        collect_ids(&expr, &mut ids);

        assert_eq!(ids.len(), 3);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3, "each occurrence needs its own id");
    }

    #[test]
    fn id_stamping_resumes_across_chained_parsers() {
        let first = tokens("a + b");
        let mut p1 = Parser::new(&first);

        p1.parse_expression().unwrap();

        let mark = p1.next_id();
        assert_eq!(mark, 2, "two variable occurrences, two ids");

        let second = tokens("c");
        let mut p2 = Parser::with_first_id(&second, mark);

        let Expr::Variable { id, .. } = p2.parse_expression().unwrap() else {
            panic!("expected a variable expression");
        };

        assert_eq!(id, mark + 1, "chained parser must not reissue an id");
        assert_eq!(p2.next_id(), mark + 1);
    }

    #[test]
    fn empty_token_slice_parses_to_an_empty_program() {
        let statements = Parser::new(&[]).parse().unwrap();

        assert!(statements.is_empty());
    }

    #[test]
    fn class_declaration_shape() {
        let tokens = tokens("class B < A { init(x) {} m() {} }");

        let statements = Parser::new(&tokens).parse().unwrap();

        let Stmt::Class {
            name,
            superclass,
            methods,
        } = &statements[0]
        else {
            panic!("expected a class declaration");
        };

        assert_eq!(name.lexeme, "B");
        assert!(matches!(superclass, Some(Expr::Variable { name, .. }) if name.lexeme == "A"));
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name.lexeme, "init");
        assert_eq!(methods[0].params.len(), 1);
        assert_eq!(methods[1].name.lexeme, "m");
    }
}
