use extbind_sys as sys;

use crate::variant::VariantKind;

/// A method bind the binding resolves once at startup.
///
/// `params` and `ret` must describe the engine's signature exactly: they feed
/// the compatibility hash the engine checks before handing out the bind.
/// A `ret` of `Some(VariantKind::Nil)` means the method returns any variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodManifest {
    pub name: &'static str,
    pub params: &'static [VariantKind],
    pub ret: Option<VariantKind>,
    pub vararg: bool,
}

impl MethodManifest {
    pub const fn new(
        name: &'static str,
        params: &'static [VariantKind],
        ret: Option<VariantKind>,
    ) -> Self {
        Self {
            name,
            params,
            ret,
            vararg: false,
        }
    }

    pub const fn vararg(mut self) -> Self {
        self.vararg = true;
        self
    }
}

/// An engine class whose tag and method binds must exist at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassManifest {
    pub name: &'static str,
    pub methods: &'static [MethodManifest],
}

impl ClassManifest {
    pub const fn new(name: &'static str, methods: &'static [MethodManifest]) -> Self {
        Self { name, methods }
    }
}

/// Settings for [`initialize`](crate::initialize).
#[derive(Debug, Clone, Copy)]
pub struct BindingConfig {
    /// Oldest engine ABI accepted. The major version must match exactly.
    pub minimum_version: sys::Version,
    /// Also send host-side errors to the engine's diagnostics channel.
    pub forward_errors_to_engine: bool,
    /// Classes and method binds the caller needs, on top of the binding's own.
    pub manifest: &'static [ClassManifest],
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            minimum_version: sys::ABI_VERSION,
            forward_errors_to_engine: true,
            manifest: &[],
        }
    }
}
