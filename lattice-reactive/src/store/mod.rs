//! Reactive Store
//!
//! Observable objects, arrays, maps and sets. A target is created raw; a
//! view over it decides whether reads are tracked and writes are allowed.
//!
//! ```text
//! Obj::object()          raw: plain reads and writes
//!   reactive(&obj)       reads track, writes trigger, nested objects wrapped
//!   shallow_reactive     like reactive, nested objects returned as stored
//!   readonly(&obj)       writes rejected; tracks only over a reactive view
//!   shallow_readonly     readonly at the top level only
//! ```
//!
//! Deps are created lazily, one per key that some subscriber actually read,
//! in a side table keyed by the target. The table goes away with the target.

mod handlers;
mod obj;
mod target;
mod trigger;
mod value;

pub use obj::Obj;
pub use target::{TargetId, TargetKind};
pub use value::Value;

pub(crate) use obj::View;
pub(crate) use target::DepKey;

/// Reactive view of a target, deep.
///
/// Wrapping any reactive view (shallow included) returns it unchanged, and
/// so does wrapping a readonly view or a target marked with [`mark_raw`].
pub fn reactive(obj: &Obj) -> Obj {
    if obj.node.skip.get() || obj.view.readonly || obj.view.tracked {
        return obj.clone();
    }
    obj.with_view(View {
        tracked: true,
        readonly: false,
        shallow: false,
    })
}

/// Reactive view that does not wrap nested objects.
pub fn shallow_reactive(obj: &Obj) -> Obj {
    if obj.node.skip.get() || obj.view.readonly {
        return obj.clone();
    }
    obj.with_view(View {
        tracked: true,
        readonly: false,
        shallow: true,
    })
}

/// Readonly view, deep. Reads track only if `obj` is a reactive view.
pub fn readonly(obj: &Obj) -> Obj {
    if obj.node.skip.get() || (obj.view.readonly && !obj.view.shallow) {
        return obj.clone();
    }
    obj.with_view(View {
        tracked: obj.view.tracked,
        readonly: true,
        shallow: false,
    })
}

/// Readonly view of the top level only.
pub fn shallow_readonly(obj: &Obj) -> Obj {
    if obj.node.skip.get() {
        return obj.clone();
    }
    obj.with_view(View {
        tracked: obj.view.tracked,
        readonly: true,
        shallow: true,
    })
}

/// The raw view of `obj`.
pub fn to_raw(obj: &Obj) -> Obj {
    obj.to_raw()
}

/// Never create views for this target. Returns the handle unchanged.
pub fn mark_raw(obj: &Obj) -> Obj {
    obj.node.skip.set(true);
    obj.clone()
}

/// Whether reads through `obj` are tracked.
pub fn is_reactive(obj: &Obj) -> bool {
    obj.view.tracked
}

pub fn is_readonly(obj: &Obj) -> bool {
    obj.view.readonly
}

pub fn is_shallow(obj: &Obj) -> bool {
    obj.view.shallow
}

/// Whether `obj` is any view other than raw.
pub fn is_proxy(obj: &Obj) -> bool {
    obj.view.tracked || obj.view.readonly
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_is_idempotent() {
        let raw = Obj::object();
        let view = reactive(&raw);
        assert_eq!(reactive(&view), view);
        assert_eq!(reactive(&raw), view);
        assert_eq!(readonly(&readonly(&raw)), readonly(&raw));

        let shallow = shallow_reactive(&Obj::object());
        assert_eq!(reactive(&shallow), shallow);
        assert!(is_shallow(&reactive(&shallow)));
    }

    #[test]
    fn view_predicates() {
        let raw = Obj::array();
        assert!(!is_proxy(&raw));

        let shallow = shallow_reactive(&raw);
        assert!(is_reactive(&shallow) && is_shallow(&shallow));
        assert!(!is_readonly(&shallow));

        let guarded = readonly(&reactive(&raw));
        assert!(is_readonly(&guarded) && is_reactive(&guarded) && is_proxy(&guarded));
        assert!(!is_reactive(&readonly(&raw)));
        assert!(is_shallow(&shallow_readonly(&raw)));

        assert_eq!(to_raw(&guarded), raw);
    }

    #[test]
    fn reactive_over_readonly_stays_readonly() {
        let guarded = readonly(&Obj::object());
        assert_eq!(reactive(&guarded), guarded);
    }

    #[test]
    fn marked_targets_are_never_wrapped() {
        let raw = mark_raw(&Obj::map());
        assert!(!is_proxy(&reactive(&raw)));
        assert!(!is_proxy(&readonly(&raw)));
    }
}
