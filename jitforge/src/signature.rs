//! `FuncSignature` (§6): canonical type ids plus positional calling-convention resolution.
//!
//! This is the ergonomic layer over `Frame`'s argument-location logic (`frame.rs`'s
//! `int_arg_location`): a signature is fixed at function-definition time, before any IR exists to
//! build a `Frame` from, so the same positional rule is replicated here against a plain
//! `(Isa, CallConv)` pair instead of a `Frame`.

use jitforge_codegen::isa::{aarch64, x86_64};
use jitforge_codegen::{ArgLocation, CallConv, Isa, MemOperand, Reg, RegClass, Width};

/// Canonical value types a `FuncSignature` can describe.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TypeId {
    /// No value (only legal as a return type).
    Void,
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    Uint8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    Uint64,
    /// A signed, pointer-width integer.
    IntPtr,
    /// An unsigned, pointer-width integer.
    UintPtr,
    /// IEEE-754 single precision.
    Float32,
    /// IEEE-754 double precision.
    Float64,
    /// A 128-bit vector (SSE `xmm`/AArch64 `v` register width).
    Vec128,
    /// A 256-bit vector (AVX `ymm` width; not a legal AArch64 vector width).
    Vec256,
    /// A 512-bit vector (AVX-512 `zmm` width; not a legal AArch64 vector width).
    Vec512,
}

impl TypeId {
    /// Which register file this type is passed and returned in, or `None` for `Void`.
    pub fn reg_class(self) -> Option<RegClass> {
        match self {
            TypeId::Void => None,
            TypeId::Float32 | TypeId::Float64 | TypeId::Vec128 | TypeId::Vec256 | TypeId::Vec512 => {
                Some(RegClass::Vec)
            }
            _ => Some(RegClass::Gp),
        }
    }

    /// The operand width a value of this type occupies, or `None` for `Void`.
    pub fn width(self) -> Option<Width> {
        match self {
            TypeId::Void => None,
            TypeId::Int8 | TypeId::Uint8 => Some(Width::W8),
            TypeId::Int16 | TypeId::Uint16 => Some(Width::W16),
            TypeId::Int32 | TypeId::Uint32 | TypeId::Float32 => Some(Width::W32),
            TypeId::Int64
            | TypeId::Uint64
            | TypeId::IntPtr
            | TypeId::UintPtr
            | TypeId::Float64 => Some(Width::W64),
            TypeId::Vec128 => Some(Width::W128),
            TypeId::Vec256 => Some(Width::W256),
            TypeId::Vec512 => Some(Width::W512),
        }
    }
}

/// A function's type: its architecture, calling convention, parameter list, and return type.
#[derive(Debug, Clone)]
pub struct FuncSignature {
    isa: Isa,
    call_conv: CallConv,
    params: Vec<TypeId>,
    returns: TypeId,
}

impl FuncSignature {
    /// Start building a signature for `isa` under `call_conv`.
    pub fn builder(isa: Isa, call_conv: CallConv) -> FuncSignatureBuilder {
        FuncSignatureBuilder { isa, call_conv, params: Vec::new(), returns: TypeId::Void }
    }

    /// The target architecture.
    pub fn isa(&self) -> Isa {
        self.isa
    }

    /// The calling convention arguments and the return value resolve under.
    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    /// The parameter types, in declaration order.
    pub fn params(&self) -> &[TypeId] {
        &self.params
    }

    /// The return type.
    pub fn returns(&self) -> TypeId {
        self.returns
    }

    /// Where the `index`-th parameter (0-based, across the whole parameter list) is passed,
    /// resolved positionally against every same-class parameter that precedes it.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub fn arg_location(&self, index: usize) -> ArgLocation {
        let ty = self.params[index];
        let class = ty.reg_class().expect("void is not a valid parameter type");
        let same_class_index = self.params[..index]
            .iter()
            .filter(|p| p.reg_class() == Some(class))
            .count() as u32;
        match class {
            RegClass::Gp => int_arg_location(self.isa, self.call_conv, same_class_index),
            RegClass::Vec => {
                vec_arg_location(self.isa, self.call_conv, same_class_index, ty.width().unwrap())
            }
            _ => unreachable!("signature parameters are only ever Gp or Vec"),
        }
    }

    /// The register the return value comes back in, or `None` for a `Void` return.
    pub fn return_location(&self) -> Option<Reg> {
        let class = self.returns.reg_class()?;
        let width = self.returns.width().unwrap();
        Some(match (self.isa, class) {
            (Isa::X86_64, RegClass::Gp) => x86_64::int_return_reg(),
            (Isa::Aarch64, RegClass::Gp) => aarch64::int_return_reg(),
            (Isa::X86_64, RegClass::Vec) => x86_64::xmm(0, width),
            (Isa::Aarch64, RegClass::Vec) => aarch64::v(0, width),
            _ => unreachable!("signature returns are only ever Gp or Vec"),
        })
    }
}

fn int_arg_location(isa: Isa, call_conv: CallConv, index: u32) -> ArgLocation {
    match isa {
        Isa::X86_64 => {
            let regs = x86_64::int_arg_regs(call_conv);
            if (index as usize) < regs.len() {
                ArgLocation::Reg(regs[index as usize])
            } else {
                let stack_index = index as usize - regs.len();
                let offset = 16 + call_conv.shadow_space() as i32 + stack_index as i32 * 8;
                ArgLocation::Stack(MemOperand::base_disp(x86_64::RBP, offset, 8))
            }
        }
        Isa::Aarch64 => {
            let regs = aarch64::int_arg_regs();
            if (index as usize) < regs.len() {
                ArgLocation::Reg(regs[index as usize])
            } else {
                let stack_index = index as usize - regs.len();
                let offset = 16 + stack_index as i32 * 8;
                ArgLocation::Stack(MemOperand::base_disp(aarch64::FP, offset, 8))
            }
        }
    }
}

fn vec_arg_location(isa: Isa, call_conv: CallConv, index: u32, width: Width) -> ArgLocation {
    let count = call_conv.vec_arg_regs();
    if index < count {
        let reg = match isa {
            Isa::X86_64 => x86_64::xmm(index as u16, width),
            Isa::Aarch64 => aarch64::v(index as u16, width),
        };
        ArgLocation::Reg(reg)
    } else {
        let stack_index = (index - count) as i32;
        let (base, extra) = match isa {
            Isa::X86_64 => (x86_64::RBP, call_conv.shadow_space() as i32),
            Isa::Aarch64 => (aarch64::FP, 0),
        };
        let offset = 16 + extra + stack_index * 8;
        ArgLocation::Stack(MemOperand::base_disp(base, offset, 8))
    }
}

/// Builds a [`FuncSignature`].
pub struct FuncSignatureBuilder {
    isa: Isa,
    call_conv: CallConv,
    params: Vec<TypeId>,
    returns: TypeId,
}

impl FuncSignatureBuilder {
    /// Append a parameter.
    pub fn param(mut self, ty: TypeId) -> Self {
        self.params.push(ty);
        self
    }

    /// Set the return type (defaults to `Void`).
    pub fn returns(mut self, ty: TypeId) -> Self {
        self.returns = ty;
        self
    }

    /// Finish building.
    pub fn finish(self) -> FuncSignature {
        FuncSignature {
            isa: self.isa,
            call_conv: self.call_conv,
            params: self.params,
            returns: self.returns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_v_first_six_int_params_are_registers() {
        let sig = FuncSignature::builder(Isa::X86_64, CallConv::SystemV)
            .param(TypeId::Int64)
            .param(TypeId::Int64)
            .param(TypeId::Int64)
            .param(TypeId::Int64)
            .param(TypeId::Int64)
            .param(TypeId::Int64)
            .param(TypeId::Int64)
            .finish();
        for i in 0..6 {
            assert!(matches!(sig.arg_location(i), ArgLocation::Reg(_)));
        }
        assert!(matches!(sig.arg_location(6), ArgLocation::Stack(_)));
    }

    #[test]
    fn mixed_gp_and_vec_params_are_independently_positioned() {
        let sig = FuncSignature::builder(Isa::X86_64, CallConv::SystemV)
            .param(TypeId::Int64)
            .param(TypeId::Float64)
            .param(TypeId::Int64)
            .finish();
        match sig.arg_location(2) {
            ArgLocation::Reg(r) => assert_eq!(r.class(), RegClass::Gp),
            _ => panic!("expected a register"),
        }
    }

    #[test]
    fn void_return_has_no_location() {
        let sig = FuncSignature::builder(Isa::X86_64, CallConv::SystemV).finish();
        assert!(sig.return_location().is_none());
    }

    #[test]
    fn int_return_resolves_to_platform_register() {
        let sig = FuncSignature::builder(Isa::X86_64, CallConv::SystemV)
            .returns(TypeId::Int64)
            .finish();
        assert!(sig.return_location().is_some());
    }
}
