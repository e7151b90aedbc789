//! Typed parameter lists.
//!
//! A [`Signature`] is a tuple of [`Marshal`] types. It knows how to decode
//! itself from either calling convention and how to stage itself into a
//! [`CallFrame`]. [`HostFn`] and [`HostCallable`] let plain closures of up to
//! six parameters stand in for host methods and callables.

use extbind_sys as sys;

use crate::error::{CallError, VariantError};
use crate::frame::CallFrame;
use crate::marshal::{FfiType, HostReturn, Marshal, kind_of};
use crate::variant::{Variant, VariantKind};

pub trait Signature: Sized + 'static {
    const ARITY: usize;

    fn param_kinds() -> Vec<VariantKind>;

    /// Decodes pointer-call arguments.
    ///
    /// # Safety
    /// `args` must hold `ARITY` pointers to live native values of the
    /// parameter kinds.
    unsafe fn from_ptr_args(args: *const sys::ConstTypePtr) -> Result<Self, VariantError>;

    /// Decodes variant-call arguments, checking count and kinds.
    fn from_variant_args(args: &[&Variant]) -> Result<Self, CallError>;

    fn push_args(self, frame: &mut CallFrame);

    fn into_variants(self) -> Vec<Variant>;
}

/// A host function over an instance of `T`, taking `Args` by value.
pub trait HostFn<T, Args, R>: 'static {
    fn call(&self, this: &mut T, args: Args) -> R;
}

/// A free host function, as wrapped by a custom callable.
pub trait HostCallable<Args, R>: 'static {
    fn invoke(&mut self, args: Args) -> R;
}

fn check_count(count: usize, arity: usize) -> Result<(), CallError> {
    match count {
        count if count < arity => Err(CallError::TooFewArguments { expected: arity }),
        count if count > arity => Err(CallError::TooManyArguments { expected: arity }),
        _ => Ok(()),
    }
}

fn decode_arg<T: Marshal>(args: &[&Variant], index: usize) -> Result<T, CallError> {
    T::try_from_variant(args[index]).map_err(|_| CallError::InvalidArgument {
        argument: index,
        expected: kind_of::<T>(),
    })
}

unsafe fn decode_ptr_arg<T: Marshal>(args: *const sys::ConstTypePtr, index: usize) -> Result<T, VariantError> {
    let ffi = unsafe { <T::Ffi as FfiType>::from_arg_ptr(*args.add(index)) };
    T::from_ffi(ffi)
}

macro_rules! impl_signature {
    ($arity:literal $(; $($ty:ident $arg:ident $index:tt),+)?) => {
        impl<$($($ty: Marshal),+)?> Signature for ($($($ty,)+)?) {
            const ARITY: usize = $arity;

            fn param_kinds() -> Vec<VariantKind> {
                vec![$($(kind_of::<$ty>()),+)?]
            }

            #[allow(unused_variables)]
            unsafe fn from_ptr_args(args: *const sys::ConstTypePtr) -> Result<Self, VariantError> {
                Ok(($($(unsafe { decode_ptr_arg::<$ty>(args, $index) }?,)+)?))
            }

            fn from_variant_args(args: &[&Variant]) -> Result<Self, CallError> {
                check_count(args.len(), $arity)?;
                Ok(($($(decode_arg::<$ty>(args, $index)?,)+)?))
            }

            #[allow(unused_variables)]
            fn push_args(self, frame: &mut CallFrame) {
                $($(frame.arg(self.$index);)+)?
            }

            fn into_variants(self) -> Vec<Variant> {
                vec![$($(self.$index.to_variant()),+)?]
            }
        }

        impl<T, F, R, $($($ty),+)?> HostFn<T, ($($($ty,)+)?), R> for F
        where
            F: Fn(&mut T, $($($ty),+)?) -> R + 'static,
            R: HostReturn,
        {
            fn call(&self, this: &mut T, ($($($arg,)+)?): ($($($ty,)+)?)) -> R {
                self(this, $($($arg),+)?)
            }
        }

        impl<F, R, $($($ty),+)?> HostCallable<($($($ty,)+)?), R> for F
        where
            F: FnMut($($($ty),+)?) -> R + 'static,
            R: HostReturn,
        {
            fn invoke(&mut self, ($($($arg,)+)?): ($($($ty,)+)?)) -> R {
                self($($($arg),+)?)
            }
        }
    };
}

impl_signature!(0);
impl_signature!(1; A a 0);
impl_signature!(2; A a 0, B b 1);
impl_signature!(3; A a 0, B b 1, C c 2);
impl_signature!(4; A a 0, B b 1, C c 2, D d 3);
impl_signature!(5; A a 0, B b 1, C c 2, D d 3, E e 4);
impl_signature!(6; A a 0, B b 1, C c 2, D d 3, E e 4, G g 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Vector2;

    #[test]
    fn kinds_and_arity() {
        assert_eq!(<() as Signature>::ARITY, 0);
        assert_eq!(<(f64, String) as Signature>::ARITY, 2);
        assert_eq!(
            <(i64, Vector2, bool)>::param_kinds(),
            vec![VariantKind::Int, VariantKind::Vector2, VariantKind::Bool]
        );
    }

    #[test]
    fn variant_args_are_checked() {
        crate::loader::test_support::init();
        let name = Variant::from("x");
        let count = Variant::from(&3i64);

        let decoded = <(String, i64)>::from_variant_args(&[&name, &count]).unwrap();
        assert_eq!(decoded, ("x".to_owned(), 3));

        assert_eq!(
            <(String, i64)>::from_variant_args(&[&name]),
            Err(CallError::TooFewArguments { expected: 2 })
        );
        assert_eq!(
            <(String,)>::from_variant_args(&[&name, &count]),
            Err(CallError::TooManyArguments { expected: 1 })
        );
        assert_eq!(
            <(String, String)>::from_variant_args(&[&name, &count]),
            Err(CallError::InvalidArgument {
                argument: 1,
                expected: VariantKind::String,
            })
        );
    }

    #[test]
    fn pointer_args_decode_in_order() {
        crate::loader::test_support::init();
        let x = 2.5f64;
        let flag_native = sys::from_bool(true);
        let args: [sys::ConstTypePtr; 2] = [
            std::ptr::from_ref(&x).cast(),
            std::ptr::from_ref(&flag_native).cast(),
        ];
        let decoded = unsafe { <(f64, bool)>::from_ptr_args(args.as_ptr()) }.unwrap();
        assert_eq!(decoded, (2.5, true));
    }

    #[test]
    fn closures_become_host_functions() {
        struct Counter(i64);
        let add = |this: &mut Counter, by: i64, twice: bool| {
            this.0 += if twice { by * 2 } else { by };
            this.0
        };
        let mut counter = Counter(1);
        assert_eq!(HostFn::call(&add, &mut counter, (3i64, true)), 7);

        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut record = {
            let seen = seen.clone();
            move |text: String| seen.borrow_mut().push(text)
        };
        HostCallable::invoke(&mut record, ("a".to_owned(),));
        assert_eq!(*seen.borrow(), vec!["a".to_owned()]);
    }
}
