use std::marker::PhantomData;

use rustc_hash::FxHashMap;

use crate::class::HostClass;
use crate::dispatch::trampoline::{ClassRecord, MethodRecord, SignalRecord};
use crate::error::BindError;
use crate::marshal::HostReturn;
use crate::signature::{HostFn, Signature};
use crate::string_name::StringName;
use crate::variant::VariantKind;

/// Collects the overrides, methods and signals of a host class.
///
/// Handed to [`HostClass::register`]; nothing reaches the engine until the
/// whole class is registered.
///
/// ```ignore
/// builder
///     .virtual_method("_process", |this: &mut Mover, delta: f64| this.elapsed += delta)
///     .method("speed", |this: &mut Mover| this.speed)
///     .signal("arrived", &[("at", VariantKind::Vector2)]);
/// ```
pub struct ClassBuilder<T: HostClass> {
    virtuals: Vec<MethodRecord>,
    methods: Vec<MethodRecord>,
    signals: Vec<SignalRecord>,
    _class: PhantomData<fn() -> T>,
}

impl<T: HostClass> ClassBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            virtuals: Vec::new(),
            methods: Vec::new(),
            signals: Vec::new(),
            _class: PhantomData,
        }
    }

    /// Overrides the engine virtual `name`.
    ///
    /// The parameter and return types must be those the engine declares for
    /// the virtual: overrides are only ever pointer-called.
    pub fn virtual_method<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: Signature,
        R: HostReturn + 'static,
        F: HostFn<T, A, R>,
    {
        self.virtuals.push(MethodRecord::new::<T, A, R, F>(name, f));
        self
    }

    /// Exposes a method the engine and scripts can call by name.
    pub fn method<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: Signature,
        R: HostReturn + 'static,
        F: HostFn<T, A, R>,
    {
        self.methods.push(MethodRecord::new::<T, A, R, F>(name, f));
        self
    }

    /// Declares a signal with named, typed parameters.
    pub fn signal(&mut self, name: &str, params: &[(&str, VariantKind)]) -> &mut Self {
        self.signals.push(SignalRecord {
            name: StringName::new(name),
            params: params
                .iter()
                .map(|(param, kind)| (StringName::new(param), *kind))
                .collect(),
        });
        self
    }

    pub(crate) fn finish(self) -> Result<ClassRecord, BindError> {
        let class = <T as HostClass>::NAME;
        let mut virtuals = FxHashMap::default();
        for method in self.virtuals {
            let label = method.label.clone();
            if virtuals.insert(method.name, Box::new(method)).is_some() {
                return Err(BindError::Registration(format!("{label} is overridden twice")));
            }
        }
        for (index, method) in self.methods.iter().enumerate() {
            if self.methods[..index].iter().any(|other| other.name == method.name) {
                return Err(BindError::Registration(format!("{} is declared twice", method.label)));
            }
        }
        for (index, signal) in self.signals.iter().enumerate() {
            if self.signals[..index].iter().any(|other| other.name == signal.name) {
                return Err(BindError::Registration(format!(
                    "signal '{}' of '{class}' is declared twice",
                    signal.name
                )));
            }
        }
        Ok(ClassRecord {
            name: class,
            virtuals,
            methods: self.methods.into_iter().map(Box::new).collect(),
            signals: self.signals,
        })
    }
}

impl<T: HostClass> std::fmt::Debug for ClassBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassBuilder")
            .field("class", &<T as HostClass>::NAME)
            .field("virtuals", &self.virtuals.len())
            .field("methods", &self.methods.len())
            .field("signals", &self.signals.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::HostBase;
    use crate::classes::Node;

    struct Probe {
        _base: HostBase<Probe>,
    }

    impl HostClass for Probe {
        const NAME: &'static str = "Probe";
        type Base = Node;

        fn init(base: HostBase<Self>) -> Self {
            Probe { _base: base }
        }
    }

    #[test]
    fn records_carry_signatures() {
        crate::loader::test_support::init();
        let mut builder = ClassBuilder::<Probe>::new();
        builder
            .virtual_method("_process", |_this: &mut Probe, _delta: f64| {})
            .method("scaled", |_this: &mut Probe, by: f64, times: i64| by * times as f64)
            .signal("hit", &[("damage", VariantKind::Int)]);
        let record = builder.finish().unwrap();

        assert_eq!(record.name, "Probe");
        let process = &record.virtuals[&StringName::new("_process")];
        assert_eq!(process.params, vec![VariantKind::Float]);
        assert_eq!(process.ret, None);
        assert_eq!(record.methods[0].params, vec![VariantKind::Float, VariantKind::Int]);
        assert_eq!(record.methods[0].ret, Some(VariantKind::Float));
        assert_eq!(record.signals[0].params[0].1, VariantKind::Int);
    }

    #[test]
    fn duplicates_are_refused() {
        crate::loader::test_support::init();
        let mut builder = ClassBuilder::<Probe>::new();
        builder
            .virtual_method("_ready", |_this: &mut Probe| {})
            .virtual_method("_ready", |_this: &mut Probe| {});
        assert!(matches!(builder.finish(), Err(BindError::Registration(_))));

        let mut builder = ClassBuilder::<Probe>::new();
        builder.signal("hit", &[]).signal("hit", &[("x", VariantKind::Int)]);
        assert!(matches!(builder.finish(), Err(BindError::Registration(_))));
    }
}
