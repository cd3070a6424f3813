//! Property values, child stacks and their derived signals

use arbiter_core::{Context, ContextError, Module, Property, PropertyAccess, QualifiedName, Signal};
use serde_json::json;

use crate::common::{MODULE, context, context_with_property, property, property_changed};

fn spikes_on(ctx: &Context, signal: &Signal) -> usize {
    ctx.live_spikes()
        .iter()
        .filter(|spike| spike.signal() == signal)
        .count()
}

#[test]
fn writes_emit_changed_with_the_new_value() {
    let (ctx, _) = context_with_property();
    assert!(ctx.set(&property(), "one").unwrap());
    let spikes = ctx.live_spikes();
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0].signal(), &property_changed());
    assert_eq!(spikes[0].payload(), Some(&json!("one")));
}

#[test]
fn repeated_changes_replace_the_pending_spike() {
    let (ctx, _) = context_with_property();
    ctx.set(&property(), 1).unwrap();
    ctx.set(&property(), 2).unwrap();
    assert_eq!(spikes_on(&ctx, &property_changed()), 1);
    assert_eq!(ctx.get(&property()).unwrap(), json!(2));
}

#[test]
fn unchanged_writes_are_silent_unless_configured() {
    let (ctx, _) = context_with_property();
    ctx.set(&property(), "same").unwrap();
    ctx.tick();
    let before = ctx.spike_count();
    assert!(!ctx.set(&property(), "same").unwrap());
    assert_eq!(ctx.spike_count(), before);

    let loud = QualifiedName::new(MODULE, "loud");
    ctx.add_prop(
        Property::new("loud")
            .in_module(MODULE)
            .always_signal_changed(true),
    )
    .unwrap();
    assert!(ctx.set(&loud, json!(null)).unwrap());
}

#[test]
fn push_and_pop_work_on_the_child_stack() {
    let (ctx, _) = context_with_property();
    ctx.push(&property(), "first").unwrap();
    ctx.push(&property(), "second").unwrap();
    assert_eq!(ctx.children(&property()).unwrap(), [json!("first"), json!("second")]);
    assert_eq!(spikes_on(&ctx, &Signal::new(MODULE, "property:pushed")), 2);

    assert_eq!(ctx.pop(&property()).unwrap(), json!("second"));
    assert_eq!(ctx.pop(&property()).unwrap(), json!("first"));
    assert_eq!(spikes_on(&ctx, &Signal::new(MODULE, "property:popped")), 2);
    assert!(matches!(
        ctx.pop(&property()),
        Err(ContextError::EmptyPop(_))
    ));
}

#[test]
fn allow_flags_are_enforced_for_external_callers() {
    let (ctx, _) = context();
    ctx.register_module(
        Module::new(MODULE)
            .property(Property::new("fixed").allow_write(false).allow_push(false))
            .property(Property::new("hidden").allow_read(false).allow_pop(false)),
    );
    let fixed = QualifiedName::new(MODULE, "fixed");
    let hidden = QualifiedName::new(MODULE, "hidden");

    assert!(matches!(
        ctx.set(&fixed, 1),
        Err(ContextError::AccessDenied { access: PropertyAccess::Write, .. })
    ));
    assert!(matches!(
        ctx.push(&fixed, 1),
        Err(ContextError::AccessDenied { access: PropertyAccess::Push, .. })
    ));
    assert!(matches!(
        ctx.get(&hidden),
        Err(ContextError::AccessDenied { access: PropertyAccess::Read, .. })
    ));
    ctx.push(&hidden, 1).unwrap();
    assert!(matches!(
        ctx.pop(&hidden),
        Err(ContextError::AccessDenied { access: PropertyAccess::Pop, .. })
    ));
    assert_eq!(ctx.spike_count(), 1);
}

#[test]
fn defaults_are_readable_before_any_write() {
    let (ctx, _) = context();
    ctx.register_module(Module::new(MODULE).property(Property::new("p").default_value("init")));
    assert_eq!(ctx.get(&QualifiedName::new(MODULE, "p")).unwrap(), json!("init"));
    assert!(matches!(
        ctx.get(&QualifiedName::new(MODULE, "missing")),
        Err(ContextError::UnknownProperty { .. })
    ));
}
