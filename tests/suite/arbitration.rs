//! Conflicting writers: the more specific state wins

use arbiter_core::{Property, QualifiedName, State, StateContext, s};

use crate::common::{MODULE, context_with_property, name, noop, property, signal};

fn writer(state: &str) -> State {
    let target = property();
    let value = state.to_string();
    State::new(state, move |ctx: &mut StateContext<'_>| {
        ctx.set(&target, value.clone()).map(|_| ())
    })
    .in_module(MODULE)
    .write(property())
}

#[test]
fn most_specific_writer_wins() {
    let (ctx, _) = context_with_property();
    ctx.add_state(writer("broad").cond(s(signal("x")))).unwrap();
    ctx.add_state(writer("narrow").cond(s(signal("x")) & s(signal("y"))))
        .unwrap();

    ctx.emit(signal("x"), None, false);
    ctx.emit(signal("y"), None, false);
    let report = ctx.tick();
    assert_eq!(report.fired, [name("narrow")]);
    assert_eq!(report.suppressed, [name("broad")]);
    assert_eq!(ctx.get(&property()).unwrap(), "narrow");
}

#[test]
fn suppressed_activations_are_reset() {
    let (ctx, _) = context_with_property();
    ctx.add_state(writer("broad").cond(s(signal("x")))).unwrap();
    ctx.add_state(writer("narrow").cond(s(signal("x")) & s(signal("y"))))
        .unwrap();

    ctx.emit(signal("x"), None, false);
    ctx.emit(signal("y"), None, false);
    ctx.tick();
    // The loser does not fire later on the same spikes.
    assert!(ctx.tick().is_idle());
}

#[test]
fn ties_go_to_the_earlier_registration() {
    let (ctx, _) = context_with_property();
    ctx.add_state(writer("first").cond(s(signal("x")))).unwrap();
    ctx.add_state(writer("second").cond(s(signal("x")))).unwrap();

    ctx.emit(signal("x"), None, false);
    let report = ctx.tick();
    assert_eq!(report.fired, [name("first")]);
    assert_eq!(report.suppressed, [name("second")]);
}

#[test]
fn disjoint_writers_fire_together() {
    let (ctx, _) = context_with_property();
    ctx.add_prop(Property::new("other").in_module(MODULE)).unwrap();
    ctx.add_state(writer("one").cond(s(signal("x")))).unwrap();
    let other = QualifiedName::new(MODULE, "other");
    ctx.add_state(
        State::new("two", noop)
            .in_module(MODULE)
            .write(other)
            .cond(s(signal("x"))),
    )
    .unwrap();
    // Neither writes anything: no conflict.
    ctx.add_state(State::new("three", noop).in_module(MODULE).cond(s(signal("x"))))
        .unwrap();

    ctx.emit(signal("x"), None, false);
    let report = ctx.tick();
    assert_eq!(report.fired.len(), 3);
    assert!(report.suppressed.is_empty());
}

#[test]
fn shared_trigger_scores_by_fan_out_and_exclusive_branch_scores_one() {
    let (ctx, _) = context_with_property();
    let on_x = |state: &str| State::new(state, noop).in_module(MODULE).cond(s(signal("x")));
    ctx.add_state(on_x("a").emits()).unwrap();
    ctx.add_state(on_x("b")).unwrap();
    ctx.add_state(on_x("c")).unwrap();
    ctx.add_state(
        State::new("d", noop)
            .in_module(MODULE)
            .cond(s(signal("x")) & s(signal("a"))),
    )
    .unwrap();

    // `d` references `x` too, so four states share it.
    assert_eq!(ctx.signal_specificity(&signal("x")), 0.25);
    assert_eq!(ctx.signal_specificity(&signal("a")), 1.0);
    for state in ["a", "b", "c"] {
        assert_eq!(ctx.activations(&name(state)).unwrap()[0].specificity, 0.25);
    }
    assert_eq!(ctx.activations(&name("d")).unwrap()[0].specificity, 1.0);

    ctx.emit(signal("x"), None, false);
    assert_eq!(ctx.tick().fired, [name("a"), name("b"), name("c")]);
}
