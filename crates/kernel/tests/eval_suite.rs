//! End-to-end evaluation suite.
//!
//! Each test builds a fresh minimal world, submits MOO programs as eval
//! tasks, and reads the result back through the wizard's session channel
//! (the same path `byred --eval` uses). Results come back as literals and
//! are parsed for comparison, so every assertion exercises the parser,
//! the evaluator, the scheduler and the store together.

use byre_core::literal::parse_literal;
use byre_core::{Error, Objid, Var};
use byre_db::Store;
use byre_kernel::tasks::{Submission, TaskSpec};
use byre_kernel::{Config, Scheduler, World};
use may::sync::mpmc;
use std::sync::Arc;
use std::time::Duration;

const WIZ: Objid = Objid(1);

struct Harness {
    world: Arc<World>,
    sched: Arc<Scheduler>,
    lines: mpmc::Receiver<String>,
}

impl Harness {
    fn new() -> Harness {
        Harness::with_config(Config::default())
    }

    fn with_config(config: Config) -> Harness {
        let world = Arc::new(World::new(Store::minimal(), config));
        let sched = Arc::new(Scheduler::new());
        let lines = world.sessions.attach(WIZ);
        Harness {
            world,
            sched,
            lines,
        }
    }

    fn run(&self, source: &str) -> Vec<String> {
        self.sched.submit(
            &self.world,
            Submission {
                spec: TaskSpec::Eval {
                    player: WIZ,
                    progr: WIZ,
                    source: source.to_string(),
                },
                delay: Duration::ZERO,
            },
        );
        self.sched.wait_idle();
        let mut out = Vec::new();
        while let Ok(line) = self.lines.try_recv() {
            out.push(line);
        }
        out
    }

    /// Run a program and parse the `=> literal` echo back into a value.
    fn eval(&self, source: &str) -> Var {
        let lines = self.run(source);
        let result = lines
            .iter()
            .find_map(|l| l.strip_prefix("=> "))
            .unwrap_or_else(|| panic!("no result line in {lines:?} for {source:?}"));
        parse_literal(result.as_bytes())
            .unwrap_or_else(|e| panic!("unparseable result {result:?}: {e}"))
    }

    /// Evaluate a single expression.
    fn expr(&self, expression: &str) -> Var {
        self.eval(&format!("return {expression};"))
    }

    /// Run a program expected to abort; returns the player-visible lines.
    fn run_aborting(&self, source: &str) -> Vec<String> {
        let lines = self.run(source);
        assert!(
            !lines.iter().any(|l| l.starts_with("=> ")),
            "expected an abort, got {lines:?}"
        );
        lines
    }
}

fn lit(src: &str) -> Var {
    parse_literal(src.as_bytes()).expect("bad expected literal")
}

// ----------------------------------------------------------------------
// Values and expressions
// ----------------------------------------------------------------------

#[test]
fn list_cow_and_slicing() {
    let h = Harness::new();
    let v = h.eval(
        "a = {1, 2, 3}; b = a; b[1] = 99; \
         return {a, b, a[1..2], b[1..3], b[3..1]};",
    );
    assert_eq!(v, lit("{{1, 2, 3}, {99, 2, 3}, {1, 2}, {99, 2, 3}, {}}"));
}

#[test]
fn type_strictness() {
    let h = Harness::new();
    let v = h.expr(
        "{1 == 1.0, `1 + 1.0 ! E_TYPE => \"caught\"', `1.0 / 0.0 ! E_DIV => \"caught\"'}",
    );
    assert_eq!(v, lit("{0, \"caught\", \"caught\"}"));
}

#[test]
fn in_operator_returns_one_based_index() {
    let h = Harness::new();
    let v = h.expr("{\"b\" in {\"a\", \"b\", \"c\"}, \"z\" in {\"a\", \"b\", \"c\"}}");
    assert_eq!(v, lit("{2, 0}"));
}

#[test]
fn arithmetic_follows_the_rules() {
    let h = Harness::new();
    assert_eq!(h.expr("7 / 2"), Var::Int(3));
    assert_eq!(h.expr("2 ^ 10"), Var::Int(1024));
    assert_eq!(h.expr("`5 % 0 ! E_DIV => \"div\"'"), Var::str("div"));
    assert_eq!(h.expr("`2 ^ -1 ! E_TYPE => \"neg\"'"), Var::str("neg"));
    assert_eq!(h.expr("1 < 2 && \"a\" < \"b\""), Var::Int(1));
    assert_eq!(h.expr("`1 < 2.0 ! E_TYPE => \"mixed\"'"), Var::str("mixed"));
    assert_eq!(h.expr("6 &. 3"), Var::Int(2));
    assert_eq!(h.expr("1 << 4"), Var::Int(16));
}

#[test]
fn logical_operators_return_last_operand() {
    let h = Harness::new();
    assert_eq!(h.expr("0 || \"fallback\""), Var::str("fallback"));
    assert_eq!(h.expr("1 && {2}"), lit("{2}"));
    assert_eq!(h.expr("0 && \"never\""), Var::Int(0));
}

#[test]
fn range_markers_resolve_against_length() {
    let h = Harness::new();
    assert_eq!(h.expr("{1, 2, 3, 4}[2..$]"), lit("{2, 3, 4}"));
    assert_eq!(h.expr("\"byre\"[^..2]"), Var::str("by"));
    assert_eq!(h.expr("{1, 2, 3}[$]"), Var::Int(3));
    assert_eq!(
        h.expr("`{1, 2}[0..1] ! E_RANGE => \"range\"'"),
        Var::str("range")
    );
}

#[test]
fn nested_indexed_assignment_is_cow() {
    let h = Harness::new();
    let v = h.eval(
        "a = {{1, 2}, \"xy\"}; b = a; a[1][2] = 99; a[2][1] = \"z\"; \
         return {a, b};",
    );
    assert_eq!(v, lit("{{{1, 99}, \"zy\"}, {{1, 2}, \"xy\"}}"));
}

#[test]
fn string_indexing_is_byte_based() {
    let h = Harness::new();
    assert_eq!(h.expr("\"hello\"[2]"), Var::str("e"));
    assert_eq!(h.expr("length(\"hello\")"), Var::Int(5));
    let v = h.eval("s = \"abc\"; s[2] = \"X\"; return s;");
    assert_eq!(v, Var::str("aXc"));
}

#[test]
fn map_literals_and_access() {
    let h = Harness::new();
    assert_eq!(h.expr("[1 -> \"one\", \"k\" -> 2][\"k\"]"), Var::Int(2));
    assert_eq!(
        h.expr("`[1 -> 2][9] ! E_RANGE => \"absent\"'"),
        Var::str("absent")
    );
    let v = h.eval("m = [1 -> \"one\"]; n = m; n[2] = \"two\"; return {m, n};");
    assert_eq!(v, lit("{[1 -> \"one\"], [1 -> \"one\", 2 -> \"two\"]}"));
    assert_eq!(h.expr("mapkeys([\"a\" -> 1, \"b\" -> 2])"), lit("{\"a\", \"b\"}"));
    assert_eq!(h.expr("maphaskey([\"a\" -> 1], \"a\")"), Var::Int(1));
}

#[test]
fn map_iteration_binds_value_then_key() {
    let h = Harness::new();
    let v = h.eval(
        "out = {}; for v, k in ([\"a\" -> 1, \"b\" -> 2]) out = {@out, k, v}; endfor \
         return out;",
    );
    assert_eq!(v, lit("{\"a\", 1, \"b\", 2}"));
}

#[test]
fn scatter_assignment() {
    let h = Harness::new();
    let v = h.eval("{a, ?b = 5, @rest} = {1}; return {a, b, rest};");
    assert_eq!(v, lit("{1, 5, {}}"));
    let v = h.eval("{a, ?b = 5, @rest, c} = {1, 2, 3, 4}; return {a, b, rest, c};");
    assert_eq!(v, lit("{1, 2, {3}, 4}"));
    assert_eq!(
        h.expr("`{a, b} = {1} ! E_ARGS => \"few\"'"),
        Var::str("few")
    );
    assert_eq!(
        h.expr("`{a} = {1, 2} ! E_ARGS => \"many\"'"),
        Var::str("many")
    );
}

#[test]
fn splice_requires_lists() {
    let h = Harness::new();
    assert_eq!(h.expr("{1, @{2, 3}, 4}"), lit("{1, 2, 3, 4}"));
    assert_eq!(h.expr("`{@1} ! E_TYPE => \"bad\"'"), Var::str("bad"));
}

#[test]
fn for_loops() {
    let h = Harness::new();
    let v = h.eval("sum = 0; for i in [1..5] sum = sum + i; endfor return sum;");
    assert_eq!(v, Var::Int(15));
    let v = h.eval(
        "out = {}; for x, i in ({\"a\", \"b\"}) out = {@out, i, x}; endfor return out;",
    );
    assert_eq!(v, lit("{1, \"a\", 2, \"b\"}"));
    // The loop variable keeps its last value.
    let v = h.eval("for x in ({1, 2, 3}) endfor return x;");
    assert_eq!(v, Var::Int(3));
    // Snapshot semantics: mutating the source does not change iteration.
    let v = h.eval(
        "l = {1, 2, 3}; out = {}; for x in (l) l = {}; out = {@out, x}; endfor return out;",
    );
    assert_eq!(v, lit("{1, 2, 3}"));
}

#[test]
fn labeled_break_and_continue() {
    let h = Harness::new();
    let v = h.eval(
        "out = {}; \
         while outer (1) \
           for i in [1..5] \
             if (i == 3) break outer; endif \
             out = {@out, i}; \
           endfor \
         endwhile \
         return out;",
    );
    assert_eq!(v, lit("{1, 2}"));
}

#[test]
fn ternary_and_not() {
    let h = Harness::new();
    assert_eq!(h.expr("1 ? \"y\" | \"n\""), Var::str("y"));
    assert_eq!(h.expr("!{}"), Var::Int(1));
    assert_eq!(h.expr("!E_TYPE"), Var::Int(0), "non-E_NONE errors are truthy");
}

// ----------------------------------------------------------------------
// Errors and unwinding
// ----------------------------------------------------------------------

#[test]
fn try_except_binds_only_the_code() {
    let h = Harness::new();
    let v = h.eval(
        "try raise(E_RANGE, \"detail\"); except e (E_TYPE, E_RANGE) return e; endtry",
    );
    assert_eq!(v, Var::Err(Error::Range));
}

#[test]
fn innermost_matching_handler_wins() {
    let h = Harness::new();
    let v = h.eval(
        "try \
           try raise(E_TYPE); except (E_RANGE) return \"outer-arm\"; endtry \
         except e (ANY) return {\"outer\", e}; endtry",
    );
    assert_eq!(v, lit("{\"outer\", E_TYPE}"));
}

#[test]
fn finally_error_replaces_pending_error() {
    let h = Harness::new();
    let v = h.eval(
        "try \
           try raise(E_TYPE); finally raise(E_RANGE); endtry \
         except e (ANY) return e; endtry",
    );
    assert_eq!(v, Var::Err(Error::Range), "E_TYPE is lost");
}

#[test]
fn finally_runs_on_return_and_can_override() {
    let h = Harness::new();
    let v = h.eval(
        "add_property(#0, \"log\", 0, {player, \"rw\"}); \
         try return 1; finally #0.log = 1; endtry",
    );
    // The finally ran even though the body returned.
    assert_eq!(v, Var::Int(1));
    assert_eq!(h.expr("#0.log"), Var::Int(1));
    let v = h.eval("try return 1; finally return 2; endtry");
    assert_eq!(v, Var::Int(2));
}

#[test]
fn error_variable_is_function_scoped() {
    let h = Harness::new();
    let v = h.eval(
        "try raise(E_PERM); except e (ANY) endtry \
         return e;",
    );
    assert_eq!(v, Var::Err(Error::Perm));
}

#[test]
fn unhandled_errors_abort_with_a_traceback() {
    let h = Harness::new();
    let lines = h.run_aborting("raise(E_QUOTA, \"over\");");
    assert!(lines.iter().any(|l| l.contains("E_QUOTA")), "{lines:?}");
    assert!(lines.iter().any(|l| l.contains("End of traceback")));
}

#[test]
fn error_precedence_invind_first() {
    let h = Harness::new();
    assert_eq!(
        h.expr("`#999.name ! E_INVIND => \"inv\"'"),
        Var::str("inv")
    );
    assert_eq!(
        h.expr("`#999:poke() ! E_INVIND => \"inv\"'"),
        Var::str("inv")
    );
}

#[test]
fn variables_are_function_scoped_and_e_varnf() {
    let h = Harness::new();
    assert_eq!(
        h.expr("`nosuchvar ! E_VARNF => \"unbound\"'"),
        Var::str("unbound")
    );
    let v = h.eval("if (1) x = 5; endif return x;");
    assert_eq!(v, Var::Int(5), "assignments are function-scoped, not block-scoped");
}

// ----------------------------------------------------------------------
// Objects, properties, verbs
// ----------------------------------------------------------------------

#[test]
fn inheritance_and_clear_property() {
    let h = Harness::new();
    let v = h.eval(
        "p = create(#1); add_property(p, \"x\", 7, {player, \"rw\"}); \
         c = create(p); \
         r1 = is_clear_property(c, \"x\"); \
         c.x = 99; \
         r2 = is_clear_property(c, \"x\"); \
         clear_property(c, \"x\"); \
         r3 = is_clear_property(c, \"x\"); \
         return {r1, r2, r3, c.x};",
    );
    assert_eq!(v, lit("{1, 0, 1, 7}"));
}

#[test]
fn create_recycle_recreate_keep_invariants() {
    let h = Harness::new();
    let v = h.eval(
        "p = create(#1); add_property(p, \"x\", 1, {player, \"r\"}); \
         o = create(p); \
         recycle(o); \
         r1 = valid(o); \
         o2 = recreate(o, #1); \
         return {r1, o == o2, parents(o2), `o2.x ! E_PROPNF => \"gone\"'};",
    );
    assert_eq!(v, lit("{0, 1, {#1}, \"gone\"}"));
}

#[test]
fn recycled_ids_are_not_reused() {
    let h = Harness::new();
    let v = h.eval(
        "a = create(#1); recycle(a); b = create(#1); \
         return {b > a, valid(a), max_object() == b};",
    );
    assert_eq!(v, lit("{1, 0, 1}"));
}

#[test]
fn move_maintains_location_and_contents() {
    let h = Harness::new();
    let v = h.eval(
        "room = create(#1); thing = create(#1); \
         move(thing, room); \
         r1 = {thing.location, thing in room.contents}; \
         move(thing, #-1); \
         r2 = {thing.location, room.contents}; \
         return {r1, r2};",
    );
    let Var::List(items) = v else { panic!() };
    let Var::List(r1) = &items[0] else { panic!() };
    assert_eq!(r1[1], Var::Int(1));
    assert_eq!(items[1], lit("{#-1, {}}"));
}

#[test]
fn move_rejects_recursion() {
    let h = Harness::new();
    let v = h.expr(
        "`move(create(#1), #999) ! E_INVARG => \"badloc\"'",
    );
    assert_eq!(v, Var::str("badloc"));
    let v = h.eval(
        "bag = create(#1); box = create(#1); move(box, bag); \
         return `move(bag, box) ! E_RECMOVE => \"cycle\"';",
    );
    assert_eq!(v, Var::str("cycle"));
}

#[test]
fn builtin_properties_read_and_enumerate() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); o.name = \"widget\"; \
         add_property(o, \"size\", 3, {player, \"r\"}); \
         return {o.name, o.owner, properties(o), \
                 `property_info(o, \"name\") ! E_PROPNF => \"builtin\"'};",
    );
    assert_eq!(v, lit("{\"widget\", #1, {\"size\"}, \"builtin\"}"));
}

#[test]
fn permission_string_canonical_forms() {
    let h = Harness::new();
    assert_eq!(
        h.expr("`add_property(create(#1), \"p\", 0, {player, \"wr\"}) ! E_INVARG => \"bad\"'"),
        Var::str("bad")
    );
    assert_eq!(
        h.expr("`add_property(create(#1), \"p\", 0, {player, \"c\"}) ! E_INVARG => \"bad\"'"),
        Var::str("bad")
    );
}

#[test]
fn property_permissions_are_enforced() {
    let h = Harness::new();
    let v = h.eval(
        "p = create(#1); add_property(p, \"x\", 1, {#1, \"\"}); \
         peon = create(#1); \
         set_task_perms(peon); \
         return {`p.x ! E_PERM => \"read\"', `p.x = 2 ! E_PERM => \"write\"'};",
    );
    assert_eq!(v, lit("{\"read\", \"write\"}"));
}

#[test]
fn verbs_and_dispatch() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); \
         add_verb(o, {player, \"rxd\", \"gr*eet hello\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_code(o, \"greet\", {\"return {this, verb, args};\"}); \
         return {o:greet(1, 2), o:gr(\"alias\"), o:hello()};",
    );
    let Var::List(items) = v else { panic!() };
    let Var::List(first) = &items[0] else { panic!() };
    assert_eq!(first[1], Var::str("greet"));
    assert_eq!(first[2], lit("{1, 2}"));
    let Var::List(second) = &items[1] else { panic!() };
    assert_eq!(second[1], Var::str("gr"));
}

#[test]
fn verb_code_round_trip_and_errors() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); \
         add_verb(o, {player, \"rxd\", \"probe\"}, {\"this\", \"none\", \"this\"}); \
         ok = set_verb_code(o, \"probe\", {\"return 42;\"}); \
         bad = set_verb_code(o, \"probe\", {\"return 42\"}); \
         return {ok, length(bad) > 0, verb_code(o, \"probe\"), o:probe()};",
    );
    assert_eq!(
        v,
        lit("{{}, 1, {\"return 42;\"}, 42}"),
        "failed compile leaves the old code"
    );
}

#[test]
fn verb_args_canonical_preposition() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); \
         add_verb(o, {player, \"rxd\", \"put\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_args(o, \"put\", {\"any\", \"in\", \"this\"}); \
         r1 = verb_args(o, \"put\"); \
         r2 = `set_verb_args(o, \"put\", {\"any\", \"with/using\", \"any\"}) ! E_INVARG => \"slash\"'; \
         return {r1, r2};",
    );
    assert_eq!(
        v,
        lit("{{\"any\", \"in/inside/into\", \"this\"}, \"slash\"}"),
        "only single-token prepositions are accepted as input"
    );
}

#[test]
fn verb_without_x_bit_needs_wizardry() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); \
         add_verb(o, {player, \"rd\", \"hidden\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_code(o, \"hidden\", {\"return 1;\"}); \
         r1 = o:hidden(); \
         set_task_perms(create(#1)); \
         r2 = `o:hidden() ! E_PERM => \"noexec\"'; \
         return {r1, r2};",
    );
    assert_eq!(v, lit("{1, \"noexec\"}"));
}

#[test]
fn chparent_reconciles_slots() {
    let h = Harness::new();
    let v = h.eval(
        "a = create(#1); add_property(a, \"pa\", 1, {player, \"r\"}); \
         b = create(#1); add_property(b, \"pb\", 2, {player, \"r\"}); \
         o = create(a); \
         r1 = o.pa; \
         chparent(o, b); \
         return {r1, `o.pa ! E_PROPNF => \"dropped\"', o.pb};",
    );
    assert_eq!(v, lit("{1, \"dropped\", 2}"));
}

#[test]
fn ancestors_and_descendants() {
    let h = Harness::new();
    let v = h.eval(
        "gp = create(#1); p = create(gp); c = create(p); \
         return {ancestors(c), ancestors(c, 1)[1], c in descendants(gp)};",
    );
    let Var::List(items) = v else { panic!() };
    let Var::List(chain) = &items[0] else { panic!() };
    assert!(chain.len() >= 2, "gp and p at least: {chain:?}");
    assert_eq!(items[2], Var::Int(1));
}

#[test]
fn sysprop_sugar_reads_and_writes_on_system_object() {
    let h = Harness::new();
    let v = h.eval(
        "add_property(#0, \"greeting\", \"hi\", {player, \"rw\"}); \
         $greeting = \"hello\"; \
         return $greeting;",
    );
    assert_eq!(v, Var::str("hello"));
}

#[test]
fn anonymous_objects_invalidate_on_structural_change() {
    let h = Harness::new();
    let v = h.eval(
        "p = create(#1); add_property(p, \"x\", 7, {player, \"rw\"}); \
         a = create(p, 1); \
         v1 = {valid(a), a.x}; \
         add_property(p, \"y\", 1, {player, \"r\"}); \
         return {v1, valid(a), `a.x ! E_INVIND => \"dead\"'};",
    );
    assert_eq!(v, lit("{{1, 7}, 0, \"dead\"}"));
}

#[test]
fn anonymous_objects_survive_value_changes() {
    let h = Harness::new();
    let v = h.eval(
        "p = create(#1); add_property(p, \"x\", 7, {player, \"rw\"}); \
         a = create(p, 1); \
         p.x = 8; \
         a.x = 9; \
         return {valid(a), a.x, p.x};",
    );
    assert_eq!(v, lit("{1, 9, 8}"));
}

#[test]
fn waifs_carry_their_own_bag() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); \
         add_verb(o, {player, \"rxd\", \"mk\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_code(o, \"mk\", {\"w = new_waif();\", \"w.tag = 5;\", \"return {typeof(w), w.tag};\"}); \
         return o:mk();",
    );
    assert_eq!(v, lit("{13, 5}"));
}

// ----------------------------------------------------------------------
// Builtins
// ----------------------------------------------------------------------

#[test]
fn conversion_builtins() {
    let h = Harness::new();
    assert_eq!(h.expr("typeof(1.5)"), Var::Int(9));
    assert_eq!(h.expr("typeof(E_NONE)"), Var::Int(3));
    assert_eq!(h.expr("toint(\"42\")"), Var::Int(42));
    assert_eq!(h.expr("toint(2.9)"), Var::Int(2));
    assert_eq!(h.expr("toobj(7)"), Var::obj(7));
    assert_eq!(h.expr("tostr(1, \" & \", {1})"), Var::str("1 & {list}"));
    assert_eq!(h.expr("tostr(E_TYPE)"), Var::str("Type mismatch"));
    assert_eq!(h.expr("toliteral([1 -> {2}])"), Var::str("[1 -> {2}]"));
    assert_eq!(h.expr("tofloat(\"2.5\")"), Var::Float(2.5));
}

#[test]
fn value_bytes_is_stable_and_monotone() {
    let h = Harness::new();
    let v = h.eval(
        "base = value_bytes({}); one = value_bytes({1}); \
         return {one > base, value_bytes({1, 2}) - base == 2 * value_bytes(1)};",
    );
    assert_eq!(v, lit("{1, 1}"));
}

#[test]
fn list_builtins() {
    let h = Harness::new();
    assert_eq!(h.expr("listappend({1, 2}, 9, 0)"), lit("{9, 1, 2}"));
    assert_eq!(h.expr("`listappend({1}, 9, 5) ! E_RANGE => \"r\"'"), Var::str("r"));
    assert_eq!(h.expr("listinsert({1, 2}, 9, 99)"), lit("{1, 2, 9}"));
    assert_eq!(h.expr("listdelete({1, 2, 3}, 2)"), lit("{1, 3}"));
    assert_eq!(h.expr("listset({1, 2}, 9, 2)"), lit("{1, 9}"));
    assert_eq!(h.expr("setadd({1, 1}, 1)"), lit("{1, 1}"));
    assert_eq!(h.expr("setremove({1, 2, 1}, 1)"), lit("{2, 1}"));
    assert_eq!(h.expr("reverse({1, 2, 3})"), lit("{3, 2, 1}"));
    assert_eq!(h.expr("sort({3, \"a\", 1})"), lit("{1, 3, \"a\"}"));
    assert_eq!(h.expr("unique({2, 1, 2})"), lit("{2, 1}"));
    assert_eq!(h.expr("is_member(\"A\", {\"a\"})"), Var::Int(0), "is_member is exact");
}

#[test]
fn string_builtins() {
    let h = Harness::new();
    assert_eq!(h.expr("index(\"foobar\", \"BAR\")"), Var::Int(4));
    assert_eq!(h.expr("index(\"foobar\", \"BAR\", 1)"), Var::Int(0));
    assert_eq!(h.expr("rindex(\"abcab\", \"ab\")"), Var::Int(4));
    assert_eq!(h.expr("strsub(\"a-b-c\", \"-\", \"+\")"), Var::str("a+b+c"));
    assert_eq!(h.expr("strcmp(\"a\", \"b\")"), Var::Int(-1));
    assert_eq!(h.expr("explode(\"a b  c\")"), lit("{\"a\", \"b\", \"c\"}"));
    assert_eq!(h.expr("trim(\"  hi  \")"), Var::str("hi"));
    assert_eq!(h.expr("chr(65)"), Var::str("A"));
    assert_eq!(h.expr("ord(\"A\")"), Var::Int(65));
    assert_eq!(h.expr("strtr(\"banana\", \"an\", \"om\")"), Var::str("bomomo"));
}

#[test]
fn pattern_matching_builtins() {
    let h = Harness::new();
    assert_eq!(h.expr("match(\"hello\", \"ell\")[1]"), Var::Int(2));
    assert_eq!(h.expr("match(\"x\", \"y\")"), lit("{}"));
    let v = h.eval(
        "m = match(\"the dog barks\", \"the %(%w+%)\"); \
         return substitute(\"a %1!\", m);",
    );
    assert_eq!(v, Var::str("a dog!"));
}

#[test]
fn binary_string_round_trip() {
    let h = Harness::new();
    assert_eq!(h.expr("encode_binary(\"~\")"), Var::str("~7E"));
    assert_eq!(h.expr("decode_binary(\"~41~42\")"), Var::str("AB"));
    assert_eq!(h.expr("length(decode_binary(\"~00\"))"), Var::Int(1));
    assert_eq!(h.expr("`decode_binary(\"~zz\") ! E_INVARG => \"bad\"'"), Var::str("bad"));
}

#[test]
fn json_builtins() {
    let h = Harness::new();
    assert_eq!(
        h.expr("generate_json({1, \"two\", [\"k\" -> 2]})"),
        Var::str("[1,\"two\",{\"k\":2}]")
    );
    assert_eq!(h.expr("parse_json(\"[1, 2.5, \\\"x\\\"]\")"), lit("{1, 2.5, \"x\"}"));
    let v = h.expr(
        "parse_json(generate_json({#5, E_PERM}, \"embedded-types\"), \"embedded-types\")",
    );
    assert_eq!(v, lit("{#5, E_PERM}"));
}

// ----------------------------------------------------------------------
// Tasks
// ----------------------------------------------------------------------

#[test]
fn fork_binds_id_and_copies_environment() {
    let h = Harness::new();
    let v = h.eval(
        "results = {\"parent\"}; \
         fork tid (0) \
           results = {@results, \"child\"}; \
         endfork \
         return {typeof(tid) == 0, tid > 0, results};",
    );
    // The parent's list is untouched by the child's mutation.
    assert_eq!(v, lit("{1, 1, {\"parent\"}}"));
}

#[test]
fn fork_negative_delay_is_invarg() {
    let h = Harness::new();
    let v = h.eval(
        "try fork (-1) endfork return \"ran\"; except e (E_INVARG) return e; endtry",
    );
    assert_eq!(v, Var::Err(Error::InvArg));
}

#[test]
fn fork_child_writes_are_visible_through_the_store() {
    let h = Harness::new();
    let v = h.eval(
        "add_property(#0, \"log\", {}, {player, \"rw\"}); \
         fork (0) \
           #0.log = {@#0.log, \"child\"}; \
         endfork \
         return 1;",
    );
    assert_eq!(v, Var::Int(1));
    // wait_idle ran the child to completion before we returned.
    assert_eq!(h.expr("$log"), lit("{\"child\"}"));
}

#[test]
fn suspend_resume_carries_the_value() {
    let h = Harness::new();
    let v = h.eval(
        "add_property(#0, \"got\", \"nothing\", {player, \"rw\"}); \
         fork tid (0) \
           #0.got = suspend(); \
         endfork \
         while (`resume(tid, \"handoff\") ! E_INVARG => E_INVARG' == E_INVARG) \
           suspend(0); \
         endwhile \
         return 1;",
    );
    assert_eq!(v, Var::Int(1));
    assert_eq!(h.expr("$got"), Var::str("handoff"));
}

#[test]
fn suspend_timeout_returns_zero() {
    let h = Harness::new();
    let v = h.eval("return suspend(0);");
    assert_eq!(v, Var::Int(0));
}

#[test]
fn second_resume_loses() {
    let h = Harness::new();
    let v = h.eval(
        "fork tid (0) suspend(); endfork \
         while (`resume(tid, 1) ! E_INVARG => E_INVARG' == E_INVARG) \
           suspend(0); \
         endwhile \
         return `resume(tid, 2) ! E_INVARG => \"second\"';",
    );
    assert_eq!(v, Var::str("second"));
}

#[test]
fn queued_tasks_snapshot_shape() {
    let h = Harness::new();
    let v = h.eval(
        "fork tid (10) endfork \
         q = queued_tasks(); \
         entry = 0; \
         for t in (q) \
           if (t[1] == tid) entry = t; endif \
         endfor \
         r = {length(entry), entry[5], entry[7], typeof(entry[8])}; \
         kill_task(tid); \
         return r;",
    );
    let Var::List(items) = v else { panic!() };
    assert_eq!(items[0], Var::Int(9), "queued_tasks entries are 9-tuples");
    assert_eq!(items[1], Var::Obj(WIZ));
    assert_eq!(items[3], Var::Int(0), "line number is an INT");
    // queued_tasks takes no arguments.
    assert_eq!(
        h.expr("`queued_tasks(1) ! E_ARGS => \"args\"'"),
        Var::str("args")
    );
}

#[test]
fn kill_task_aborts_a_waiting_fork() {
    let h = Harness::new();
    let v = h.eval(
        "add_property(#0, \"ran\", 0, {player, \"rw\"}); \
         fork tid (5) #0.ran = 1; endfork \
         kill_task(tid); \
         return `kill_task(tid) ! E_INVARG => \"gone\"';",
    );
    // The second kill may race the teardown; either outcome means dead.
    assert!(v == Var::str("gone") || v == Var::Int(0));
    assert_eq!(h.expr("$ran"), Var::Int(0));
}

#[test]
fn self_kill_runs_finally_and_never_returns() {
    let h = Harness::new();
    h.run(
        "add_property(#0, \"cleanup\", 0, {player, \"rw\"});
         return 1;",
    );
    let lines = h.run_aborting(
        "try \
           kill_task(task_id()); \
           #0.cleanup = \"unreachable\"; \
         finally \
           #0.cleanup = 1; \
         endtry",
    );
    assert!(lines.iter().any(|l| l.contains("killed")), "{lines:?}");
    assert_eq!(h.expr("$cleanup"), Var::Int(1));
}

#[test]
fn tick_exhaustion_is_uncatchable_but_runs_finally() {
    let mut config = Config::default();
    config.background_ticks = 3_000;
    let h = Harness::with_config(config);
    h.run("add_property(#0, \"mark\", 0, {player, \"rw\"}); return 1;");
    let lines = h.run_aborting(
        "try \
           try while (1) endwhile except e (ANY) #0.mark = \"caught\"; endtry \
         finally \
           #0.mark = 99; \
         endtry",
    );
    assert!(lines.iter().any(|l| l.contains("ticks")), "{lines:?}");
    assert_eq!(h.expr("$mark"), Var::Int(99), "except must not see the abort");
}

#[test]
fn yin_refreshes_the_tick_budget() {
    let mut config = Config::default();
    config.background_ticks = 5_000;
    let h = Harness::with_config(config);
    let v = h.eval(
        "n = 0; \
         while (n < 5000) \
           n = n + 1; \
           yin(); \
         endwhile \
         return n;",
    );
    assert_eq!(v, Var::Int(5000));
}

#[test]
fn task_identity_and_perms() {
    let h = Harness::new();
    assert_eq!(h.expr("task_id() > 0"), Var::Int(1));
    assert_eq!(h.expr("caller_perms()"), Var::obj(-1), "root has no caller");
    let v = h.eval(
        "peon = create(#1); \
         set_task_perms(peon); \
         return {task_id() > 0, `create(#1, #1) ! E_PERM => \"denied\"'};",
    );
    let Var::List(items) = v else { panic!() };
    assert_eq!(items[0], Var::Int(1));
}

#[test]
fn caller_perms_sees_the_calling_verb() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); \
         add_verb(o, {player, \"rxd\", \"who\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_code(o, \"who\", {\"return caller_perms();\"}); \
         return o:who();",
    );
    assert_eq!(v, Var::Obj(WIZ));
}

#[test]
fn callers_shape_matches_the_contract() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); \
         add_verb(o, {player, \"rxd\", \"probe\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_code(o, \"probe\", {\"return {length(callers()), length(callers()[1]), typeof(callers()[1][6]), length(callers(0)[1])};\"}); \
         return o:probe();",
    );
    assert_eq!(v, lit("{1, 6, 0, 5}"));
}

#[test]
fn set_task_local_is_per_task() {
    let h = Harness::new();
    let v = h.eval("set_task_local({1, 2}); return task_local();");
    assert_eq!(v, lit("{1, 2}"));
    // A fresh task starts clean.
    assert_eq!(h.expr("task_local()"), Var::Int(0));
}

#[test]
fn maxrec_limits_recursion() {
    let h = Harness::new();
    let v = h.eval(
        "o = create(#1); \
         add_verb(o, {player, \"rxd\", \"loop\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_code(o, \"loop\", {\"return this:loop();\"}); \
         return `o:loop() ! E_MAXREC => \"deep\"';",
    );
    assert_eq!(v, Var::str("deep"));
}

#[test]
fn notify_reaches_the_session() {
    let h = Harness::new();
    let lines = h.run("notify(player, \"ping\"); return 0;");
    assert!(lines.iter().any(|l| l == "ping"), "{lines:?}");
}

#[test]
fn create_runs_initialize_and_errors_do_not_unmake() {
    let h = Harness::new();
    let v = h.eval(
        "base = create(#1); \
         add_property(base, \"inited\", 0, {player, \"rw\"}); \
         add_verb(base, {player, \"rxd\", \"initialize\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_code(base, \"initialize\", {\"this.inited = 1;\"}); \
         kid = create(base); \
         return kid.inited;",
    );
    assert_eq!(v, Var::Int(1));
    let v = h.eval(
        "base = create(#1); \
         add_verb(base, {player, \"rxd\", \"initialize\"}, {\"this\", \"none\", \"this\"}); \
         set_verb_code(base, \"initialize\", {\"raise(E_NACC);\"}); \
         before = max_object(); \
         e = `create(base) ! ANY'; \
         return {e, max_object() > before};",
    );
    assert_eq!(v, lit("{E_NACC, 1}"), "creation is not rolled back");
}

#[test]
fn command_tasks_bind_command_context() {
    let h = Harness::new();
    h.eval(
        "o = create(#1); \
         add_property(#0, \"cmdlog\", 0, {player, \"rw\"}); \
         add_verb(o, {player, \"rd\", \"poke\"}, {\"any\", \"none\", \"any\"}); \
         set_verb_code(o, \"poke\", {\"#0.cmdlog = {verb, args, argstr, dobjstr, player};\"}); \
         return o;",
    );
    let Var::Obj(o) = h.expr("max_object()") else {
        panic!("max_object not an object")
    };
    // No 'x' bit on the verb: command dispatch does not consult it.
    h.sched.submit(
        &h.world,
        Submission {
            spec: TaskSpec::Command {
                player: WIZ,
                this: o,
                verb: "poke".to_string(),
                args: vec![Var::str("stick")],
                argstr: "with stick".to_string(),
                dobj: byre_core::NOTHING,
                dobjstr: "stick".to_string(),
                prepstr: "with".to_string(),
                iobj: byre_core::NOTHING,
                iobjstr: String::new(),
            },
            delay: Duration::ZERO,
        },
    );
    h.sched.wait_idle();
    assert_eq!(
        h.expr("$cmdlog"),
        lit("{\"poke\", {\"stick\"}, \"with stick\", \"stick\", #1}")
    );
}

#[test]
fn ownership_quota_is_enforced() {
    let h = Harness::new();
    let v = h.eval(
        "base = create(#1); base.f = 1; \
         peon = create(#1); \
         add_property(peon, \"ownership_quota\", 1, {#1, \"rw\"}); \
         set_task_perms(peon); \
         first = create(base); \
         second = `create(base) ! E_QUOTA => \"quota\"'; \
         return {valid(first), second};",
    );
    assert_eq!(v, lit("{1, \"quota\"}"));
}
