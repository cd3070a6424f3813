//! Emission, adoption and wiping

use arbiter_core::{ContextError, State, StateContext, s};

use crate::common::{MODULE, context, context_with_property, property_changed, signal};

#[test]
fn emit_adds_exactly_one_spike() {
    let (ctx, _) = context();
    ctx.emit(property_changed(), None, false);
    assert_eq!(ctx.spike_count(), 1);
    ctx.emit(property_changed(), None, false);
    assert_eq!(ctx.spike_count(), 2);
}

#[test]
fn wiping_emit_removes_prior_spikes_and_their_children() {
    let (ctx, _) = context();
    let parent = ctx.emit(property_changed(), None, false);
    let child = ctx.emit(signal("child"), None, false);
    ctx.adopt(parent, child).unwrap();
    ctx.emit(signal("bystander"), None, false);
    assert_eq!(ctx.spike_count(), 3);

    ctx.emit(property_changed(), None, true);
    let remaining: Vec<String> = ctx
        .live_spikes()
        .iter()
        .map(|spike| spike.signal().to_string())
        .collect();
    assert_eq!(remaining, ["module:bystander", "module:property:changed"]);
}

#[test]
fn adoption_rejects_cycles() {
    let (ctx, _) = context();
    let a = ctx.emit(signal("a"), None, false);
    let b = ctx.emit(signal("b"), None, false);
    let c = ctx.emit(signal("c"), None, false);
    ctx.adopt(a, b).unwrap();
    ctx.adopt(b, c).unwrap();

    assert!(matches!(
        ctx.adopt(c, a),
        Err(ContextError::InvalidAdoption { .. })
    ));
    assert!(matches!(
        ctx.adopt(a, a),
        Err(ContextError::InvalidAdoption { .. })
    ));
    assert_eq!(ctx.wipe(a), 3);
    assert!(matches!(
        ctx.adopt(a, b),
        Err(ContextError::UnknownSpike(_))
    ));
}

#[test]
fn spikes_emitted_by_a_handler_are_adopted_by_its_triggers() {
    let (ctx, _) = context_with_property();
    ctx.add_state(
        State::new("a", |ctx: &mut StateContext<'_>| ctx.emit().map(|_| ()))
            .in_module(MODULE)
            .cond(s(signal("go")))
            .emits(),
    )
    .unwrap();

    let trigger = ctx.emit(signal("go"), None, false);
    ctx.tick();
    assert_eq!(ctx.spike_count(), 2);
    let spikes = ctx.live_spikes();
    let origin = spikes.iter().find(|spike| spike.id() == trigger).unwrap();
    assert_eq!(origin.children().len(), 1);

    assert_eq!(ctx.wipe(trigger), 2);
    assert_eq!(ctx.spike_count(), 0);
}
