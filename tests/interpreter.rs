#[cfg(test)]
mod interpreter_tests {
    use treelox as lox;

    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    use lox::interpreter::{Interpreter, RunResult};
    use lox::parser::Parser;
    use lox::scanner::Scanner;
    use lox::token::Token;

    /// A `print` sink the test keeps a handle to after handing it to the
    /// interpreter.
    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);

            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Scan, parse, resolve and run a whole program, returning the run
    /// outcome and everything it printed.
    fn run(source: &str) -> (RunResult, String) {
        let tokens: Vec<Token> = Scanner::new(source.as_bytes())
            .collect::<Result<_, _>>()
            .expect("test source must scan");

        let statements = Parser::new(&tokens)
            .parse()
            .expect("test source must parse");

        let sink = SharedSink::default();
        let mut interpreter = Interpreter::with_output(Box::new(sink.clone()));

        let result = interpreter.resolve_and_run(&statements);

        let printed = String::from_utf8(sink.0.borrow().clone()).unwrap();

        (result, printed)
    }

    fn run_ok(source: &str) -> String {
        let (result, printed) = run(source);

        assert_eq!(result, RunResult::Success, "printed so far:\n{printed}");

        printed
    }

    /// One persistent interpreter fed a submission per call, the way the
    /// REPL drives it: each line's source and tokens are leaked (function
    /// values may borrow them for the rest of the session) and parsers are
    /// chained so expression ids stay unique across submissions.
    struct Session {
        interpreter: Interpreter<'static>,
        sink: SharedSink,
        next_id: usize,
    }

    impl Session {
        fn new() -> Self {
            let sink = SharedSink::default();

            Session {
                interpreter: Interpreter::with_output(Box::new(sink.clone())),
                sink,
                next_id: 0,
            }
        }

        fn submit(&mut self, source: &str) -> RunResult {
            let src: &'static [u8] = Box::leak(source.as_bytes().to_vec().into_boxed_slice());

            let tokens: &'static [Token<'static>] = Vec::leak(
                Scanner::new(src)
                    .collect::<Result<Vec<_>, _>>()
                    .expect("submission must scan"),
            );

            let mut parser = Parser::with_first_id(tokens, self.next_id);

            let statements = parser.parse().expect("submission must parse");

            self.next_id = parser.next_id();

            self.interpreter.resolve_and_run(&statements)
        }

        fn printed(&self) -> String {
            String::from_utf8(self.sink.0.borrow().clone()).unwrap()
        }
    }

    #[test]
    fn print_canonical_forms() {
        let printed = run_ok(
            r#"
            print nil;
            print true;
            print false;
            print 3;
            print 3.14;
            print -0.5;
            print "hi";
            fun f() {}
            print f;
            print clock;
            class A {}
            print A;
            print A();
            "#,
        );

        assert_eq!(
            printed,
            "nil\ntrue\nfalse\n3\n3.14\n-0.5\nhi\n<fun f>\n<fun clock>\n<class A>\n<instance A>\n"
        );
    }

    #[test]
    fn arithmetic_and_grouping() {
        let printed = run_ok(
            r#"
            print 1 + 2 * 3;
            print (1 + 2) * 3;
            print 7 / 2;
            print 10 - 4 - 3;
            print -(2 + 3);
            "#,
        );

        assert_eq!(printed, "7\n9\n3.5\n3\n-5\n");
    }

    #[test]
    fn string_concatenation_and_cross_type_plus() {
        let printed = run_ok(
            r#"
            print "foo" + "bar";
            print "n=" + 3;
            print 1 + "a";
            print "yes: " + true;
            print 1 + true;
            "#,
        );

        assert_eq!(printed, "foobar\nn=3\n1a\nyes: true\n2\n");
    }

    #[test]
    fn equality_coerces_where_a_promotion_exists() {
        let printed = run_ok(
            r#"
            print 1 == true;
            print true == 1;
            print "3" == 3;
            print nil == 0;
            print nil == false;
            print nil == nil;
            print "" == nil;
            print 2 != "2";
            "#,
        );

        assert_eq!(
            printed,
            "true\ntrue\ntrue\nfalse\nfalse\ntrue\nfalse\nfalse\n"
        );
    }

    #[test]
    fn comparisons_order_numbers_and_strings() {
        let printed = run_ok(
            r#"
            print 1 < 2;
            print 2 <= 2;
            print "abc" < "abd";
            print true < 2;
            print "10" < 9;
            "#,
        );

        // "10" < 9 promotes 9 onto the string rung: "10" < "9".
        assert_eq!(printed, "true\ntrue\ntrue\ntrue\ntrue\n");
    }

    #[test]
    fn comparisons_reject_unordered_operands() {
        let (result, _) = run("print nil < 1;");
        assert_eq!(result, RunResult::RuntimeFailed);

        let (result, _) = run("print true > false;");
        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let (result, _) = run("print 1 / 0;");
        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn logical_operators_yield_booleans() {
        let printed = run_ok(
            r#"
            print 1 or 2;
            print nil or "x";
            print nil and 2;
            print 0 and 1;
            print "" or "";
            print 1 and "yes";
            "#,
        );

        assert_eq!(printed, "true\ntrue\nfalse\nfalse\nfalse\ntrue\n");
    }

    #[test]
    fn logical_operators_short_circuit() {
        let printed = run_ok(
            r#"
            fun boom() { boom(); return boom(); }
            print false and boom();
            print true or boom();
            "#,
        );

        assert_eq!(printed, "false\ntrue\n");
    }

    #[test]
    fn control_flow_if_while_for() {
        let printed = run_ok(
            r#"
            if (1 < 2) print "then"; else print "else";
            if ("") print "then"; else print "else";

            var i = 0;
            while (i < 2) {
                print i;
                i = i + 1;
            }

            for (var j = 0; j < 3; j = j + 1) print j;
            "#,
        );

        assert_eq!(printed, "then\nelse\n0\n1\n0\n1\n2\n");
    }

    #[test]
    fn return_unwinds_through_loops() {
        let printed = run_ok(
            r#"
            fun first_above(limit) {
                for (var i = 0; ; i = i + 1) {
                    if (i > limit) return i;
                }
            }
            print first_above(1);
            "#,
        );

        assert_eq!(printed, "2\n");
    }

    #[test]
    fn function_without_return_yields_nil() {
        let printed = run_ok(
            r#"
            fun noop() {}
            print noop();
            "#,
        );

        assert_eq!(printed, "nil\n");
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let printed = run_ok(
            r#"
            fun makeCounter() {
                var i = 0;
                fun count() {
                    i = i + 1;
                    print i;
                }
                return count;
            }

            var counter = makeCounter();
            counter();
            counter();

            var other = makeCounter();
            other();
            "#,
        );

        // Each call to makeCounter gets a fresh `i`.
        assert_eq!(printed, "1\n2\n1\n");
    }

    #[test]
    fn recursion_keeps_activations_isolated() {
        let printed = run_ok(
            r#"
            fun fib(n) {
                if (n < 2) return n;
                return fib(n - 1) + fib(n - 2);
            }
            print fib(10);
            "#,
        );

        assert_eq!(printed, "55\n");
    }

    #[test]
    fn detached_function_value_stays_callable_after_shadowing() {
        let printed = run_ok(
            r#"
            fun greet() { print "original"; }
            var saved = greet;
            var greet = "not a function anymore";
            saved();
            "#,
        );

        assert_eq!(printed, "original\n");
    }

    #[test]
    fn variable_references_bind_statically() {
        let printed = run_ok(
            r#"
            var a = "global";
            {
                fun showA() { print a; }
                showA();
                var a = "block";
                showA();
            }
            "#,
        );

        // showA resolved `a` before the block-local shadow existed, so it
        // keeps printing the global.
        assert_eq!(printed, "global\nglobal\n");
    }

    #[test]
    fn globals_may_be_referenced_before_definition_inside_bodies() {
        let printed = run_ok(
            r#"
            fun f() { return later(); }
            fun later() { return 7; }
            print f();
            "#,
        );

        assert_eq!(printed, "7\n");
    }

    #[test]
    fn assignment_to_undeclared_variable_fails_at_runtime() {
        let (result, printed) = run("x = 3;");

        assert_eq!(result, RunResult::RuntimeFailed);
        assert_eq!(printed, "");
    }

    #[test]
    fn reading_undefined_variable_fails_at_runtime() {
        let (result, _) = run("print missing;");

        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn arity_is_checked_before_the_call() {
        let (result, printed) = run(
            r#"
            fun pair(a, b) { print a; }
            pair(1);
            "#,
        );

        assert_eq!(result, RunResult::RuntimeFailed);
        assert_eq!(printed, "");
    }

    #[test]
    fn only_functions_and_classes_are_callable() {
        let (result, _) = run("var x = 3; x();");

        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn unbounded_recursion_hits_the_depth_ceiling() {
        let (result, _) = run(
            r#"
            fun down() { down(); }
            down();
            "#,
        );

        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn statements_before_a_runtime_error_still_take_effect() {
        let (result, printed) = run(
            r#"
            print "before";
            print 1 / 0;
            print "after";
            "#,
        );

        assert_eq!(result, RunResult::RuntimeFailed);
        assert_eq!(printed, "before\n");
    }

    #[test]
    fn classes_construct_instances_with_fields_and_methods() {
        let printed = run_ok(
            r#"
            class Box {
                init(v) { this.v = v; }
                get() { return this.v; }
            }

            var b = Box(42);
            print b.get();
            b.v = 7;
            print b.get();
            b.extra = "new field";
            print b.extra;
            "#,
        );

        assert_eq!(printed, "42\n7\nnew field\n");
    }

    #[test]
    fn bound_methods_carry_their_receiver() {
        let printed = run_ok(
            r#"
            class Box {
                init(v) { this.v = v; }
                get() { return this.v; }
            }

            var b = Box(42);
            var detached = b.get;
            print detached();
            "#,
        );

        assert_eq!(printed, "42\n");
    }

    #[test]
    fn initializer_always_yields_the_instance() {
        let printed = run_ok(
            r#"
            class C {
                init() {
                    this.tag = "t";
                    return;
                }
            }

            print C().tag;
            "#,
        );

        assert_eq!(printed, "t\n");
    }

    #[test]
    fn class_arity_comes_from_init() {
        let (result, _) = run(
            r#"
            class P { init(a, b) {} }
            P(1);
            "#,
        );

        assert_eq!(result, RunResult::RuntimeFailed);

        let (result, _) = run("class Q {} Q(1);");

        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn inheritance_resolves_methods_up_the_chain() {
        let printed = run_ok(
            r#"
            class Base {
                init(n) { this.n = n; }
                show() { print this.n; }
            }
            class Derived < Base {
                show() {
                    print "derived";
                    super.show();
                }
            }

            var d = Derived(3);
            d.show();
            "#,
        );

        // Derived inherits Base's init; super.show sees the same receiver.
        assert_eq!(printed, "derived\n3\n");
    }

    #[test]
    fn super_skips_the_own_override() {
        let printed = run_ok(
            r#"
            class A { m() { print "A"; } }
            class B < A { m() { print "B"; super.m(); } }
            class C < B {}

            C().m();
            "#,
        );

        assert_eq!(printed, "B\nA\n");
    }

    #[test]
    fn superclass_must_be_a_class() {
        let (result, _) = run("var NotAClass = 3; class D < NotAClass {}");

        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn class_cannot_be_its_own_superclass() {
        let (result, _) = run("class A < A {}");

        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn missing_property_is_a_runtime_error() {
        let (result, _) = run("class A {} print A().nope;");

        assert_eq!(result, RunResult::RuntimeFailed);

        let (result, _) = run("var x = 3; print x.y;");

        assert_eq!(result, RunResult::RuntimeFailed);
    }

    #[test]
    fn instances_keep_their_class_alive_past_its_scope() {
        let printed = run_ok(
            r#"
            var escaped = nil;
            {
                class Ephemeral {
                    speak() { print "still here"; }
                }
                escaped = Ephemeral();
            }
            escaped.speak();
            "#,
        );

        assert_eq!(printed, "still here\n");
    }

    #[test]
    fn closures_keep_their_environment_alive_past_its_scope() {
        let printed = run_ok(
            r#"
            var escaped = nil;
            {
                var captured = "alive";
                fun read() { print captured; }
                escaped = read;
            }
            escaped();
            "#,
        );

        assert_eq!(printed, "alive\n");
    }

    #[test]
    fn truthiness_of_scalars_in_conditions() {
        let printed = run_ok(
            r#"
            if (0) print "t"; else print "f";
            if (0.5) print "t"; else print "f";
            if ("") print "t"; else print "f";
            if ("x") print "t"; else print "f";
            if (nil) print "t"; else print "f";
            "#,
        );

        assert_eq!(printed, "f\nt\nf\nt\nf\n");
    }

    #[test]
    fn clock_is_a_registered_native() {
        let printed = run_ok("print clock() >= 0;");

        assert_eq!(printed, "true\n");
    }

    #[test]
    fn session_globals_survive_across_submissions() {
        let mut session = Session::new();

        assert_eq!(session.submit("var a = 1;"), RunResult::Success);
        assert_eq!(session.submit("print a;"), RunResult::Success);
        assert_eq!(session.submit("a = a + 1; print a;"), RunResult::Success);

        assert_eq!(session.printed(), "1\n2\n");
    }

    #[test]
    fn session_functions_stay_callable_in_later_submissions() {
        let mut session = Session::new();

        assert_eq!(
            session.submit("fun double(n) { return n + n; }"),
            RunResult::Success
        );
        assert_eq!(session.submit("print double(21);"), RunResult::Success);

        assert_eq!(session.printed(), "42\n");
    }

    #[test]
    fn session_submissions_do_not_inherit_each_others_resolution() {
        let mut session = Session::new();

        // The first line records a depth-1 distance for a local; the
        // second line's global references must not pick it up.
        assert_eq!(
            session.submit("fun f(x) { { print x; } }"),
            RunResult::Success
        );
        assert_eq!(session.submit("var y = 5; print y;"), RunResult::Success);
        assert_eq!(session.submit("f(3);"), RunResult::Success);

        assert_eq!(session.printed(), "5\n3\n");
    }

    #[test]
    fn session_closures_keep_their_distances_across_submissions() {
        let mut session = Session::new();

        assert_eq!(
            session.submit(
                r#"
                fun makeCounter() {
                    var i = 0;
                    fun count() {
                        i = i + 1;
                        print i;
                    }
                    return count;
                }
                var c = makeCounter();
                "#,
            ),
            RunResult::Success
        );
        assert_eq!(session.submit("c();"), RunResult::Success);
        assert_eq!(session.submit("c();"), RunResult::Success);

        assert_eq!(session.printed(), "1\n2\n");
    }

    #[test]
    fn session_failed_submission_aborts_only_itself() {
        let mut session = Session::new();

        assert_eq!(session.submit("var a = 1;"), RunResult::Success);

        // A runtime failure and a static rejection in between.
        assert_eq!(session.submit("print 1 / 0;"), RunResult::RuntimeFailed);
        assert_eq!(
            session.submit("{ var b = 1; var b = 2; }"),
            RunResult::StaticRejected
        );

        assert_eq!(session.submit("print a;"), RunResult::Success);

        assert_eq!(session.printed(), "1\n");
    }
}
