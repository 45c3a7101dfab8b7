use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

use pretty_assertions::assert_eq;

use rox::error::Diagnostics;
use rox::session::{RunStatus, Session};
use rox::value::Value;

/// In-memory stdout shared between the interpreter and the test.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8(bytes).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Harness {
    session: Session,
    out: SharedBuf,
}

struct Outcome {
    status: RunStatus,
    output: String,
    errors: Vec<String>,
    warnings: usize,
}

impl Harness {
    fn new() -> Self {
        Self::with_input("")
    }

    fn with_input(input: &str) -> Self {
        let out = SharedBuf::default();
        let session = Session::with_io(
            Box::new(out.clone()),
            Box::new(Cursor::new(input.as_bytes().to_vec())),
        );
        Self { session, out }
    }

    fn run(&mut self, source: &str) -> Outcome {
        let mut diagnostics = Diagnostics::new();
        let status = self.session.run(source, &mut diagnostics);

        Outcome {
            status,
            output: self.out.take(),
            errors: diagnostics.errors().iter().map(|e| e.to_string()).collect(),
            warnings: diagnostics.warnings().len(),
        }
    }
}

fn run(source: &str) -> Outcome {
    Harness::new().run(source)
}

/// Runs a program that must succeed and returns its output.
fn output_of(source: &str) -> String {
    let outcome = run(source);
    assert_eq!(outcome.status, RunStatus::Ok, "errors: {:?}", outcome.errors);
    outcome.output
}

fn runtime_error_of(source: &str) -> String {
    let outcome = run(source);
    assert_eq!(outcome.status, RunStatus::RuntimeError, "output: {}", outcome.output);
    assert_eq!(outcome.errors.len(), 1);
    outcome.errors[0].clone()
}

// ─────────────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn arithmetic_and_stringification() {
    let source = r#"
        print 1 + 2;
        print 7 / 2;
        print "con" + "cat";
        print 10 % 4;
        print -3;
        print !nil;
        print 0.1 + 0.2 == 0.3;
        print nil;
    "#;
    assert_eq!(output_of(source), "3\n3.5\nconcat\n2\n-3\ntrue\nfalse\nnil\n");
}

#[test]
fn equality_across_types() {
    let source = r#"
        print nil == nil;
        print 1 == "1";
        print "a" == "a";
        print true != false;
        class A {}
        var a = A();
        var b = A();
        print a == a;
        print a == b;
    "#;
    assert_eq!(output_of(source), "true\nfalse\ntrue\ntrue\ntrue\nfalse\n");
}

#[test]
fn logical_operators_short_circuit_and_return_operands() {
    let source = r#"
        print nil or "fallback";
        print "first" or crash();
        print false and crash();
        print 1 and 2;
    "#;
    assert_eq!(output_of(source), "fallback\nfirst\nfalse\n2\n");
}

#[test]
fn mixed_plus_is_a_runtime_error() {
    assert_eq!(
        runtime_error_of("print \"a\" + 1;"),
        "Operands must be two numbers or two strings.\n[line 1]"
    );
}

#[test]
fn comparison_requires_numbers() {
    assert_eq!(
        runtime_error_of("print 1 < \"a\";"),
        "Operands must be numbers.\n[line 1]"
    );
    assert_eq!(runtime_error_of("print -\"a\";"), "Operand must be a number.\n[line 1]");
}

#[test]
fn division_by_zero_reports_operator_line() {
    assert_eq!(
        runtime_error_of("var a = 1;\nprint a /\n 0;"),
        "Division by zero.\n[line 2]"
    );
    assert_eq!(runtime_error_of("print 5 % 0;"), "Division by zero.\n[line 1]");
}

#[test]
fn compound_assignment_and_increment() {
    let source = r#"
        var x = 5;
        x += 2;
        x *= 3;
        x -= 1;
        x /= 4;
        print x;
        x %= 3;
        print x;
        ++x;
        print x;
        --x;
        --x;
        print x;

        class P {}
        var p = P();
        p.n = 1;
        p.n += 4;
        ++p.n;
        print p.n;
    "#;
    assert_eq!(output_of(source), "5\n2\n3\n1\n6\n");
}

// ─────────────────────────────────────────────────────────────────────────────
// Variables and scope
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn shadowing_restores_outer_binding() {
    let source = "
        var x = \"global\";
        {
            var x = 1;
            {
                var x = 2;
                print x;
            }
            print x;
        }
        print x;
    ";
    assert_eq!(output_of(source), "2\n1\nglobal\n");
}

#[test]
fn closures_resolve_statically_not_dynamically() {
    let source = r#"
        var a = "global";
        {
            fun show() { print a; }
            show();
            var a = "block";
            show();
            print a;
        }
    "#;
    assert_eq!(output_of(source), "global\nglobal\nblock\n");
}

#[test]
fn undefined_variable() {
    assert_eq!(
        runtime_error_of("print nope;"),
        "Undefined variable 'nope'.\n[line 1]"
    );
    assert_eq!(
        runtime_error_of("nope = 1;"),
        "Undefined variable 'nope'.\n[line 1]"
    );
}

#[test]
fn global_redefinition_is_a_runtime_error() {
    assert_eq!(
        runtime_error_of("var a = 1;\nvar a = 2;"),
        "Variable 'a' is already defined in this scope.\n[line 2]"
    );
}

#[test]
fn same_scope_redeclaration_is_static() {
    let outcome = run("print \"start\";\n{ var a = 1; var a = 2; print a; }");
    assert_eq!(outcome.status, RunStatus::StaticError);
    assert_eq!(outcome.output, "");
}

// ─────────────────────────────────────────────────────────────────────────────
// Control flow
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn if_else_and_while() {
    let source = "
        var i = 0;
        while (i < 3) {
            if (i == 1) print \"one\"; else print i;
            i = i + 1;
        }
    ";
    assert_eq!(output_of(source), "0\none\n2\n");
}

#[test]
fn break_leaves_innermost_loop_only() {
    let source = "
        for (var i = 0; i < 3; i = i + 1) {
            var j = 0;
            while (true) {
                if (j == i) break;
                j = j + 1;
            }
            print j;
        }
        var n = 0;
        for (;;) { n = n + 1; if (n >= 4) break; }
        print n;
    ";
    assert_eq!(output_of(source), "0\n1\n2\n4\n");
}

#[test]
fn return_unwinds_through_loops() {
    let source = "
        fun find(limit) {
            var i = 0;
            while (true) {
                if (i * i > limit) return i;
                i = i + 1;
            }
        }
        print find(10);
    ";
    assert_eq!(output_of(source), "4\n");
}

#[test]
fn return_and_break_misuse_is_rejected_before_running() {
    let outcome = run("print 1;\nreturn 2;");
    assert_eq!(outcome.status, RunStatus::StaticError);
    assert_eq!(outcome.output, "");
    assert_eq!(
        outcome.errors,
        vec!["[line 2] Error at 'return': Can't return from top-level code."]
    );

    let outcome = run("print 1;\nbreak;");
    assert_eq!(outcome.status, RunStatus::StaticError);
    assert_eq!(outcome.output, "");
}

// ─────────────────────────────────────────────────────────────────────────────
// Functions and closures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn recursion() {
    let source = "
        fun fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print fib(15);
    ";
    assert_eq!(output_of(source), "610\n");
}

#[test]
fn unbounded_recursion_is_a_runtime_error() {
    let mut harness = Harness::new();

    let first = harness.run("fun f(n) { return f(n + 1); }\nf(0);\nprint \"after\";");
    assert_eq!(first.status, RunStatus::RuntimeError);
    assert_eq!(first.errors, vec!["Stack overflow.\n[line 1]"]);
    assert_eq!(first.output, "");

    // The session survives and the depth counter starts from zero again.
    let second = harness.run("fun g(n) { if (n == 0) return \"done\"; return g(n - 1); }\nprint g(50);");
    assert_eq!(second.status, RunStatus::Ok, "errors: {:?}", second.errors);
    assert_eq!(second.output, "done\n");
}

#[test]
fn deep_recursion_below_the_limit_succeeds() {
    let source = "
        fun count(n) {
            if (n == 0) return 0;
            return count(n - 1) + 1;
        }
        print count(900);
    ";
    assert_eq!(output_of(source), "900\n");
}

#[test]
fn compound_property_assignment_resolves_its_target_once() {
    let source = "{ class C {} var o = C(); o.f = 1; (fun(){ var u = 1; return o; })().f += 1; print o.f; }";
    let outcome = run(source);

    assert_eq!(outcome.status, RunStatus::Ok, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.output, "2\n");
    assert_eq!(outcome.warnings, 1);
}

#[test]
fn counters_keep_independent_state() {
    let source = "
        fun makeCounter() {
            var count = 0;
            fun counter() {
                count = count + 1;
                return count;
            }
            return counter;
        }
        var c1 = makeCounter();
        var c2 = makeCounter();
        print c1();
        print c1();
        print c2();
        print c1();
    ";
    assert_eq!(output_of(source), "1\n2\n1\n3\n");
}

#[test]
fn closures_share_captured_variables() {
    let source = "
        var get;
        var set;
        fun pair() {
            var value = \"initial\";
            fun g() { return value; }
            fun s(v) { value = v; }
            get = g;
            set = s;
        }
        pair();
        print get();
        set(\"changed\");
        print get();
    ";
    assert_eq!(output_of(source), "initial\nchanged\n");
}

#[test]
fn arity_mismatch_fails_before_body_runs() {
    let outcome = run("fun f(a) { print \"ran\"; }\nf(1, 2);");
    assert_eq!(outcome.status, RunStatus::RuntimeError);
    assert_eq!(outcome.output, "");
    assert_eq!(outcome.errors, vec!["Expected 1 arguments but got 2.\n[line 2]"]);
}

#[test]
fn calling_a_non_callable() {
    assert_eq!(
        runtime_error_of("var x = 1;\nx();"),
        "Can only call functions and classes.\n[line 2]"
    );
}

#[test]
fn lambdas_and_expression_bodies() {
    let source = "
        var add = fun (a, b): a + b;
        print add(1, 2);
        print (fun (x): x * 2)(4);
        fun square(x): x * x;
        print square(5);
        fun apply(f, v) { return f(v); }
        print apply(fun (n) { return n + 100; }, 1);
        print add;
    ";
    assert_eq!(output_of(source), "3\n8\n25\n101\n<fn lambda>\n");
}

#[test]
fn function_without_return_yields_nil() {
    assert_eq!(output_of("fun f() {}\nprint f();"), "nil\n");
}

// ─────────────────────────────────────────────────────────────────────────────
// Classes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn fields_methods_and_initializer() {
    let source = "
        class Point {
            init(x, y) {
                this.x = x;
                this.y = y;
            }
            sum() { return this.x + this.y; }
        }
        var p = Point(3, 4);
        print p.sum();
        p.x = 10;
        print p.sum();
        var m = p.sum;
        print m();
    ";
    assert_eq!(output_of(source), "7\n14\n14\n");
}

#[test]
fn initializer_always_yields_the_instance() {
    let source = "
        class A {
            init() {
                this.v = 1;
                return;
            }
        }
        var a = A();
        print a.init() == a;
        print a.v;
    ";
    assert_eq!(output_of(source), "true\n1\n");
}

#[test]
fn class_arity_follows_init() {
    assert_eq!(
        runtime_error_of("class P { init(a, b) {} }\nP(1);"),
        "Expected 2 arguments but got 1.\n[line 2]"
    );
    assert_eq!(
        runtime_error_of("class Q {}\nQ(1);"),
        "Expected 0 arguments but got 1.\n[line 2]"
    );
}

#[test]
fn super_dispatch_keeps_original_receiver() {
    let source = r#"
        class A {
            method() { print "A method"; }
            whoami() { return this.name; }
        }
        class B : A {
            method() { print "B method"; }
            test() { super.method(); }
            identify() { return super.whoami(); }
        }
        class C : B {}

        var c = C();
        c.name = "c instance";
        c.test();
        c.method();
        print c.identify();
    "#;
    assert_eq!(output_of(source), "A method\nB method\nc instance\n");
}

#[test]
fn inherited_initializer() {
    let source = "
        class Base { init(n) { this.n = n; } }
        class Derived : Base {}
        print Derived(7).n;
    ";
    assert_eq!(output_of(source), "7\n");
}

#[test]
fn getters_run_on_access() {
    let source = r#"
        class Circle {
            init(r) { this.r = r; }
            area { return 3 * this.r * this.r; }
        }
        print Circle(2).area;

        class A { name { return "A"; } }
        class B : A { name { return "B+" + super.name; } }
        print B().name;
    "#;
    assert_eq!(output_of(source), "12\nB+A\n");
}

#[test]
fn static_methods_and_inheritance() {
    let source = "
        class Math {
            class square(n): n * n;
            class version { return 2; }
        }
        class More : Math {}
        print Math.square(3);
        print More.square(4);
        print Math.version;
    ";
    assert_eq!(output_of(source), "9\n16\n2\n");
}

#[test]
fn property_errors() {
    assert_eq!(
        runtime_error_of("print 1.x;"),
        "Only instances have properties.\n[line 1]"
    );
    assert_eq!(
        runtime_error_of("var s = \"str\";\ns.x = 1;"),
        "Only instances have fields.\n[line 2]"
    );
    assert_eq!(
        runtime_error_of("class A {}\nA().nope;"),
        "Undefined property 'nope'.\n[line 2]"
    );
    assert_eq!(
        runtime_error_of("var NotClass = 1;\nclass B : NotClass {}"),
        "Superclass must be a class.\n[line 2]"
    );
}

#[test]
fn callable_and_instance_display() {
    let source = "
        class Bagel { eat() {} }
        fun f() {}
        var b = Bagel();
        print Bagel;
        print b;
        print b.eat;
        print f;
        print clock;
    ";
    assert_eq!(
        output_of(source),
        "<class Bagel>\n<Bagel instance>\n<bound method Bagel.eat>\n<fn f>\n<native fn clock>\n"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-ins and sessions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn clock_returns_seconds() {
    assert_eq!(output_of("print clock() > 1000000000;"), "true\n");
}

#[test]
fn read_returns_lines_then_nil() {
    let mut harness = Harness::with_input("hello\r\nworld\n");
    let outcome = harness.run("print read();\nprint read();\nprint read();");

    assert_eq!(outcome.status, RunStatus::Ok);
    assert_eq!(outcome.output, "hello\nworld\nnil\n");
}

#[test]
fn print_builtin_is_reachable_through_the_interpreter() {
    let mut harness = Harness::new();
    let interpreter = harness.session.interpreter();

    let print = interpreter.global("print").expect("print is defined");
    let result = interpreter.call(&print, vec![Value::string("hi")], 1).unwrap();

    assert_eq!(result, Value::Nil);
    assert_eq!(harness.out.take(), "hi\n");
}

#[test]
fn breakpoint_is_a_no_op_for_the_program() {
    assert_eq!(output_of("breakpoint();\nprint 1;"), "1\n");
}

#[test]
fn runtime_error_aborts_only_the_current_run() {
    let mut harness = Harness::new();

    let first = harness.run("var a = 1;\nprint a;\na();\nprint \"unreached\";");
    assert_eq!(first.status, RunStatus::RuntimeError);
    assert_eq!(first.output, "1\n");

    let second = harness.run("print a + 1;");
    assert_eq!(second.status, RunStatus::Ok);
    assert_eq!(second.output, "2\n");
}

#[test]
fn environment_is_restored_after_error_inside_call() {
    let mut harness = Harness::new();

    let first = harness.run("fun f() { var x = 1; { nope(); } }\nf();");
    assert_eq!(first.status, RunStatus::RuntimeError);

    let second = harness.run("var y = 2;\nprint y;");
    assert_eq!(second.status, RunStatus::Ok, "errors: {:?}", second.errors);
    assert_eq!(second.output, "2\n");
}

#[test]
fn closures_survive_across_runs() {
    let mut harness = Harness::new();

    let first = harness.run(
        "fun make() { var n = 0; fun inc() { n = n + 1; return n; } return inc; }\nvar c = make();",
    );
    assert_eq!(first.status, RunStatus::Ok);

    let second = harness.run("print c();\nprint c();");
    assert_eq!(second.status, RunStatus::Ok, "errors: {:?}", second.errors);
    assert_eq!(second.output, "1\n2\n");
}

#[test]
fn static_error_in_one_run_does_not_poison_the_next() {
    let mut harness = Harness::new();

    let first = harness.run("print ;");
    assert_eq!(first.status, RunStatus::StaticError);

    let second = harness.run("print 3;");
    assert_eq!(second.status, RunStatus::Ok);
    assert_eq!(second.output, "3\n");
}

#[test]
fn warnings_do_not_block_execution() {
    let outcome = run("{ var unused = 1; }\nprint \"ran\";");
    assert_eq!(outcome.status, RunStatus::Ok);
    assert_eq!(outcome.warnings, 1);
    assert_eq!(outcome.output, "ran\n");
}
