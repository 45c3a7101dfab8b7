use pretty_assertions::assert_eq;

use rox::ast::{Expr, ExprId, NodeIds, Stmt};
use rox::ast_printer::AstPrinter;
use rox::error::Diagnostics;
use rox::parser::Parser;
use rox::scanner::scan;
use rox::token::TokenType;

fn parse_program(source: &str) -> (Vec<Stmt>, Vec<String>) {
    let mut diagnostics = Diagnostics::new();
    let tokens = scan(source, &mut diagnostics);
    let statements = Parser::new(tokens).parse(&mut diagnostics);
    let errors = diagnostics.errors().iter().map(|e| e.to_string()).collect();
    (statements, errors)
}

fn print_expr(source: &str) -> String {
    let mut diagnostics = Diagnostics::new();
    let tokens = scan(source, &mut diagnostics);
    let expr = Parser::new(tokens).parse_expression(&mut diagnostics);
    assert!(!diagnostics.has_errors(), "unexpected errors: {:?}", diagnostics.errors());
    AstPrinter::print(&expr.unwrap())
}

#[test]
fn precedence_and_associativity() {
    assert_eq!(print_expr("1 + 2 * 3 - 4"), "(- (+ 1.0 (* 2.0 3.0)) 4.0)");
    assert_eq!(print_expr("!true == false"), "(== (! true) false)");
    assert_eq!(print_expr("a or b and c"), "(or a (and b c))");
    assert_eq!(print_expr("1 < 2 == 3 >= 4"), "(== (< 1.0 2.0) (>= 3.0 4.0))");
    assert_eq!(print_expr("a = b = 3"), "(= a (= b 3.0))");
}

#[test]
fn call_and_property_chains() {
    assert_eq!(print_expr("a.b(1)(2).c"), "(. (call (call (. a b) 1.0) 2.0) c)");
    assert_eq!(print_expr("super.go"), "(super go)");
}

#[test]
fn compound_assignment_desugars() {
    assert_eq!(print_expr("x += 2"), "(= x (+ x 2.0))");
    assert_eq!(print_expr("x %= 3"), "(= x (% x 3.0))");
    assert_eq!(print_expr("obj.f -= 1"), "(= (. obj f) (- (. obj f) 1.0))");
    assert_eq!(print_expr("++x"), "(= x (+ x 1.0))");
    assert_eq!(print_expr("--p.n"), "(= (. p n) (- (. p n) 1.0))");
}

/// Every bindable-node id under `expr`, lambda bodies included.
fn collect_ids(expr: &Expr, ids: &mut Vec<ExprId>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Unary { right, .. } => collect_ids(right, ids),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect_ids(left, ids);
            collect_ids(right, ids);
        }
        Expr::Grouping(inner) => collect_ids(inner, ids),
        Expr::Variable { id, .. } | Expr::This { id, .. } | Expr::Super { id, .. } => ids.push(*id),
        Expr::Assign { id, value, .. } => {
            ids.push(*id);
            collect_ids(value, ids);
        }
        Expr::Call {
            callee, arguments, ..
        } => {
            collect_ids(callee, ids);
            for argument in arguments {
                collect_ids(argument, ids);
            }
        }
        Expr::Lambda(decl) => {
            for stmt in &decl.body {
                match stmt {
                    Stmt::Expression(e) | Stmt::Print(e) => collect_ids(e, ids),
                    Stmt::Var {
                        initializer: Some(e),
                        ..
                    } => collect_ids(e, ids),
                    Stmt::Return { value: Some(e), .. } => collect_ids(e, ids),
                    _ => {}
                }
            }
        }
        Expr::Get { object, .. } => collect_ids(object, ids),
        Expr::Set { object, value, .. } => {
            collect_ids(object, ids);
            collect_ids(value, ids);
        }
    }
}

fn assert_unique_ids(source: &str, expected: usize) {
    let mut diagnostics = Diagnostics::new();
    let tokens = scan(source, &mut diagnostics);
    let expr = Parser::new(tokens).parse_expression(&mut diagnostics).unwrap();

    let mut ids = Vec::new();
    collect_ids(&expr, &mut ids);
    assert_eq!(ids.len(), expected, "ids in {}", source);

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len(), "duplicate ids in {}: {:?}", source, ids);
}

#[test]
fn desugared_reads_get_their_own_ids() {
    let mut diagnostics = Diagnostics::new();
    let tokens = scan("x += 1", &mut diagnostics);
    let expr = Parser::new(tokens).parse_expression(&mut diagnostics).unwrap();

    let Expr::Assign { id: write_id, value, .. } = expr else {
        panic!("expected assignment");
    };
    let Expr::Binary { left, .. } = *value else {
        panic!("expected binary value");
    };
    let Expr::Variable { id: read_id, .. } = *left else {
        panic!("expected variable read");
    };

    assert_ne!(write_id, read_id);

    // Property targets copy the whole object expression, renumbered.
    assert_unique_ids("a.b += 1", 2);
    assert_unique_ids("++a.b.c", 2);
    assert_unique_ids("f(x, y).b *= z", 7);
    assert_unique_ids("(fun () { var u = v; return o; })().f += 1", 4);
}

#[test]
fn for_loop_desugars_into_while() {
    let (statements, errors) = parse_program("for (var i = 0; i < 3; i = i + 1) print i;");
    assert!(errors.is_empty());
    assert_eq!(statements.len(), 1);

    let Stmt::Block(outer) = &statements[0] else {
        panic!("expected block, got {:?}", statements[0]);
    };
    assert!(matches!(outer[0], Stmt::Var { .. }));

    let Stmt::While { body, .. } = &outer[1] else {
        panic!("expected while, got {:?}", outer[1]);
    };
    let Stmt::Block(inner) = body.as_ref() else {
        panic!("expected loop body block");
    };
    assert!(matches!(inner[0], Stmt::Print(_)));
    assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
}

#[test]
fn for_loop_without_clauses_loops_on_true() {
    let (statements, errors) = parse_program("for (;;) break;");
    assert!(errors.is_empty());

    let Stmt::While { condition, body } = &statements[0] else {
        panic!("expected bare while");
    };
    assert_eq!(AstPrinter::print(condition), "true");
    assert!(matches!(body.as_ref(), Stmt::Break { .. }));
}

#[test]
fn class_declaration_with_all_member_kinds() {
    let source = "
        class Square : Shape {
            init(side) { this.side = side; }
            area { return this.side * this.side; }
            class unit() { return Square(1); }
            scaled(k): Square(this.side * k);
        }
    ";
    let (statements, errors) = parse_program(source);
    assert!(errors.is_empty(), "{:?}", errors);

    let Stmt::Class {
        name,
        superclass,
        methods,
        class_methods,
    } = &statements[0]
    else {
        panic!("expected class");
    };

    assert_eq!(name.lexeme, "Square");
    assert!(matches!(superclass, Some(Expr::Variable { name, .. }) if name.lexeme == "Shape"));

    let names: Vec<&str> = methods.iter().map(|m| m.display_name()).collect();
    assert_eq!(names, vec!["init", "area", "scaled"]);
    assert!(!methods[0].is_getter);
    assert!(methods[1].is_getter);
    assert_eq!(methods[1].arity(), 0);
    assert!(matches!(methods[2].body.as_slice(), [Stmt::Return { value: Some(_), .. }]));

    assert_eq!(class_methods.len(), 1);
    assert_eq!(class_methods[0].display_name(), "unit");
}

#[test]
fn lambda_expression_body_leaves_semicolon_to_statement() {
    let (statements, errors) = parse_program("var add = fun (a, b): a + b;");
    assert!(errors.is_empty(), "{:?}", errors);

    let Stmt::Var {
        initializer: Some(Expr::Lambda(decl)),
        ..
    } = &statements[0]
    else {
        panic!("expected lambda initializer");
    };

    assert_eq!(decl.arity(), 2);
    assert_eq!(decl.display_name(), "lambda");
    assert!(matches!(decl.body.as_slice(), [Stmt::Return { .. }]));
}

#[test]
fn fun_followed_by_paren_is_an_expression_statement() {
    let (statements, errors) = parse_program("fun () { print 1; };\nfun named() {}");
    assert!(errors.is_empty(), "{:?}", errors);

    assert!(matches!(&statements[0], Stmt::Expression(Expr::Lambda(_))));
    assert!(matches!(&statements[1], Stmt::Function(decl) if decl.display_name() == "named"));
}

#[test]
fn invalid_assignment_target_does_not_synchronize() {
    let (statements, errors) = parse_program("1 = 2;\nprint 3;");

    assert_eq!(errors, vec!["[line 1] Error at '=': Invalid assignment target."]);
    assert_eq!(statements.len(), 2);
}

#[test]
fn invalid_increment_target() {
    let (_, errors) = parse_program("++3;");
    assert_eq!(errors, vec!["[line 1] Error at '++': Invalid increment target."]);
}

#[test]
fn recovers_and_reports_every_statement_error() {
    let source = "var = 1;\nprint 2;\nvar y = ;\nprint 3;";
    let (statements, errors) = parse_program(source);

    assert_eq!(
        errors,
        vec![
            "[line 1] Error at '=': Expect variable name.",
            "[line 3] Error at ';': Expect expression.",
        ]
    );
    assert_eq!(statements.len(), 2);
    assert!(statements.iter().all(|s| matches!(s, Stmt::Print(_))));
}

#[test]
fn missing_semicolon_at_end_of_input() {
    let (_, errors) = parse_program("print 1");
    assert_eq!(errors, vec!["[line 1] Error at end: Expect ';' after value."]);
}

#[test]
fn too_many_arguments_is_reported_once() {
    let args: Vec<String> = (0..256).map(|i| i.to_string()).collect();
    let source = format!("f({});", args.join(", "));
    let (statements, errors) = parse_program(&source);

    assert_eq!(errors.len(), 1);
    assert!(errors[0].ends_with("Can't have more than 255 arguments."));
    assert_eq!(statements.len(), 1);
}

#[test]
fn too_many_parameters_is_reported() {
    let params: Vec<String> = (0..256).map(|i| format!("p{}", i)).collect();
    let source = format!("fun f({}) {{}}", params.join(", "));
    let (_, errors) = parse_program(&source);

    assert_eq!(errors.len(), 1);
    assert!(errors[0].ends_with("Can't have more than 255 parameters."));
}

#[test]
fn node_ids_are_unique_and_continue_across_parsers() {
    let mut diagnostics = Diagnostics::new();

    let mut first = Parser::with_ids(scan("a; a;", &mut diagnostics), NodeIds::new());
    let first_stmts = first.parse(&mut diagnostics);
    let ids = first.into_ids();

    let mut second = Parser::with_ids(scan("a;", &mut diagnostics), ids);
    let second_stmts = second.parse(&mut diagnostics);

    let collect = |stmts: &[Stmt]| -> Vec<ExprId> {
        stmts
            .iter()
            .filter_map(|s| match s {
                Stmt::Expression(Expr::Variable { id, .. }) => Some(*id),
                _ => None,
            })
            .collect()
    };

    let mut all: Vec<ExprId> = collect(&first_stmts);
    all.extend(collect(&second_stmts));

    assert_eq!(all.len(), 3);
    let mut deduped = all.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), 3);
}

#[test]
fn eof_token_is_added_when_missing() {
    let mut diagnostics = Diagnostics::new();
    let mut tokens = scan("print 1;", &mut diagnostics);
    assert_eq!(tokens.pop().map(|t| t.token_type), Some(TokenType::EOF));

    let statements = Parser::new(tokens).parse(&mut diagnostics);
    assert!(!diagnostics.has_errors());
    assert_eq!(statements.len(), 1);
}
