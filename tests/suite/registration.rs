//! State and property registration

use arbiter_core::{
    Age, AgeWindow, ContextError, Module, Property, QualifiedName, Signal, State, s,
};

use crate::common::{
    MODULE, PROPERTY, capture_logs, context, context_with_property, name, noop, property, property_changed,
    signal, state_a, state_b, state_c, state_d, state_fixture,
};

#[test]
fn add_state_completes_constraints_and_scores_specificity() {
    let (ctx, _) = context_with_property();

    ctx.add_state(state_a()).unwrap();
    let (second, logs) = capture_logs(|| ctx.add_state(state_a()));
    assert!(second.is_ok());
    assert!(logs.contains("Attempt to add state `module:a` twice!"));

    // Writes the property it is triggered by, closing a cycle on its change.
    ctx.add_state(state_fixture()).unwrap();
    assert_eq!(ctx.signal_causes(&property_changed()), [name("state_fixture")]);
    assert_eq!(ctx.signal_causes(&signal("a")), [name("a")]);
    assert!(
        ctx.conjunctions(&name("a"))
            .unwrap()
            .iter()
            .any(|conj| conj.contains(&property_changed()))
    );

    ctx.add_state(state_b()).unwrap();
    ctx.add_state(state_c()).unwrap();
    ctx.add_state(state_d()).unwrap();
    assert_eq!(ctx.activation_count(), 5);

    let d_conjunctions = ctx.conjunctions(&name("d")).unwrap();
    assert_eq!(d_conjunctions.len(), 4);
    let completed: Vec<_> = d_conjunctions.iter().filter(|conj| conj.len() > 2).collect();
    assert_eq!(completed.len(), 2);
    for conj in &completed {
        assert!(conj.is_completed());
        assert!(conj.contains(&property_changed()));
        assert!(conj.contains(&signal("a")));
    }
    assert!(
        completed[0].contains(&signal("b")) && completed[1].contains(&signal("c"))
            || completed[0].contains(&signal("c")) && completed[1].contains(&signal("b"))
    );

    assert_eq!(ctx.states_for_signal(&property_changed()).len(), 5);
    let a_acts = ctx.activations(&name("a")).unwrap();
    let b_acts = ctx.activations(&name("b")).unwrap();
    let c_acts = ctx.activations(&name("c")).unwrap();
    let d_acts = ctx.activations(&name("d")).unwrap();
    assert_eq!(a_acts.len(), 1);
    assert_eq!(b_acts.len(), 1);
    assert_eq!(c_acts.len(), 1);
    assert_eq!(d_acts.len(), 1);

    let property_spec = ctx.signal_specificity(&property_changed());
    assert_eq!(a_acts[0].specificity, property_spec);
    let a_spec = ctx.signal_specificity(&signal("a"));
    assert_eq!(a_spec, 1.0 / 3.0);
    assert_eq!(b_acts[0].specificity, a_spec);
    assert_eq!(d_acts[0].specificity, 1.0);
}

#[test]
fn re_adding_a_state_changes_nothing() {
    let (ctx, _) = context_with_property();
    ctx.add_state(state_a()).unwrap();
    ctx.add_state(state_b()).unwrap();
    ctx.add_state(state_fixture()).unwrap();
    let states = ctx.state_count();
    let activations = ctx.activation_count();
    let edges = ctx.causality_edges();
    let b_branches = ctx.conjunctions(&name("b")).unwrap().len();

    for state in [state_a(), state_b(), state_fixture()] {
        let (result, logs) = capture_logs(|| ctx.add_state(state));
        result.unwrap();
        assert!(logs.contains("twice!"));
    }
    assert_eq!(ctx.state_count(), states);
    assert_eq!(ctx.activation_count(), activations);
    assert_eq!(ctx.causality_edges(), edges);
    assert_eq!(ctx.conjunctions(&name("b")).unwrap().len(), b_branches);
}

#[test]
fn property_writers_cause_their_change_signals() {
    let (ctx, _) = context_with_property();
    ctx.add_state(State::new("reader", noop).in_module(MODULE).cond(s(property_changed())))
        .unwrap();
    assert_eq!(ctx.conjunctions(&name("reader")).unwrap().len(), 1);

    ctx.add_state(
        State::new("writer", noop)
            .in_module(MODULE)
            .cond(s(signal("q")))
            .write(property()),
    )
    .unwrap();
    assert_eq!(ctx.signal_causes(&property_changed()), [name("writer")]);
    assert_eq!(
        ctx.signal_causes(&Signal::new(MODULE, "property:pushed")),
        [name("writer")]
    );

    let conjunctions = ctx.conjunctions(&name("reader")).unwrap();
    assert_eq!(conjunctions.len(), 2);
    assert!(conjunctions[1].is_completed());
    assert!(conjunctions[1].contains(&property_changed()));
    assert!(conjunctions[1].contains(&signal("q")));

    ctx.rm_state(&name("writer")).unwrap();
    assert!(ctx.signal_causes(&property_changed()).is_empty());
    assert_eq!(ctx.conjunctions(&name("reader")).unwrap().len(), 1);
}

#[test]
fn later_causes_backfill_earlier_states() {
    let (ctx, _) = context_with_property();
    ctx.add_state(state_b()).unwrap();
    assert_eq!(ctx.conjunctions(&name("b")).unwrap().len(), 1);

    ctx.add_state(state_a()).unwrap();
    let conjunctions = ctx.conjunctions(&name("b")).unwrap();
    assert_eq!(conjunctions.len(), 2);
    assert!(conjunctions[1].contains(&property_changed()));

    ctx.rm_state(&name("a")).unwrap();
    assert_eq!(ctx.conjunctions(&name("b")).unwrap().len(), 1);
    assert_eq!(ctx.causality_edges(), 1);
}

#[test]
fn cyclic_causes_register() {
    let (ctx, _) = context_with_property();
    let ping = State::new("ping", noop)
        .in_module(MODULE)
        .cond(s(signal("pong")))
        .emits();
    let pong = State::new("pong", noop)
        .in_module(MODULE)
        .cond(s(signal("ping")))
        .emits();
    ctx.add_state(ping).unwrap();
    ctx.add_state(pong).unwrap();
    assert_eq!(ctx.state_count(), 2);
    assert_eq!(ctx.conjunctions(&name("ping")).unwrap().len(), 2);
    assert_eq!(ctx.conjunctions(&name("pong")).unwrap().len(), 2);
}

#[test]
fn configurable_ages_resolve_from_module_config() {
    let (ctx, _) = context();
    ctx.register_module(
        Module::new(MODULE)
            .config("min_age_key", 2.5)
            .config("max_age_key", 4.5)
            .property(Property::new(PROPERTY)),
    );
    let state = State::new("conf_st", noop).in_module(MODULE).cond(
        s(property_changed())
            .min_age(Age::config("min_age_key"))
            .max_age(Age::config("max_age_key")),
    );
    ctx.add_state(state).unwrap();

    let conjunctions = ctx.conjunctions(&name("conf_st")).unwrap();
    assert_eq!(conjunctions[0].leaves()[0].window(), AgeWindow::new(2.5, 4.5));
}

#[test]
fn configurable_ages_fall_back_to_defaults() {
    let (ctx, _) = context_with_property();
    let state = State::new("conf_st", noop).in_module(MODULE).cond(
        s(property_changed())
            .min_age(Age::config("min_age_key"))
            .max_age(Age::config("max_age_key")),
    );
    let (added, logs) = capture_logs(|| ctx.add_state(state));
    added.unwrap();
    assert!(logs.contains("max_age_key"));

    let conjunctions = ctx.conjunctions(&name("conf_st")).unwrap();
    assert_eq!(conjunctions[0].leaves()[0].window(), AgeWindow::new(0.0, 5.0));
}

#[test]
fn removing_a_property_removes_dependent_states() {
    let (ctx, _) = context_with_property();
    ctx.add_state(state_fixture()).unwrap();
    ctx.add_state(state_a()).unwrap();
    assert!(ctx.has_state(&name("state_fixture")));

    let removal = ctx.rm_prop(&property()).unwrap();
    assert_eq!(removal.states, [name("state_fixture")]);
    assert_eq!(removal.activations, 1);
    assert!(!ctx.has_state(&name("state_fixture")));
    assert!(!ctx.has_property(&property()));
    // `a` only listens to the property's signal; it does not reference the property.
    assert!(ctx.has_state(&name("a")));
}

#[test]
fn states_need_known_module_and_properties() {
    let (ctx, _) = context_with_property();

    let orphan = State::new("orphan", noop)
        .in_module("elsewhere")
        .cond(s(property_changed()));
    assert!(matches!(
        ctx.add_state(orphan),
        Err(ContextError::UnknownModule { .. })
    ));

    let reader = State::new("reader", noop)
        .in_module(MODULE)
        .read(QualifiedName::new(MODULE, "missing"));
    assert!(matches!(
        ctx.add_state(reader),
        Err(ContextError::UnknownProperty { .. })
    ));

    let idle = State::new("idle", noop).in_module(MODULE);
    assert!(matches!(
        ctx.add_state(idle),
        Err(ContextError::EmptyConstraint(_))
    ));
    assert_eq!(ctx.state_count(), 0);
}

#[test]
fn duplicate_properties_are_ignored() {
    let (ctx, _) = context_with_property();
    let (result, logs) = capture_logs(|| {
        ctx.add_prop(Property::new(PROPERTY).in_module(MODULE))
    });
    result.unwrap();
    assert!(logs.contains("Attempt to add property `module:property` twice!"));
    assert_eq!(ctx.property_count(), 1);
}

#[test]
fn properties_need_a_registered_module() {
    let (ctx, _) = context();
    assert!(matches!(
        ctx.add_prop(Property::new("p").in_module("nowhere")),
        Err(ContextError::UnknownModule { .. })
    ));
}
