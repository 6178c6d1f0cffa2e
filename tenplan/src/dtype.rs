use half::{bf16, f16};

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DType {
    BF16,
    F16,
    F32,
    F64,
    U8,
    I8,
    I16,
    I32,
    I64,
    Bool,
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            DType::BF16 => "BF16",
            DType::F16 => "F16",
            DType::F32 => "F32",
            DType::F64 => "F64",
            DType::U8 => "U8",
            DType::I8 => "I8",
            DType::I16 => "I16",
            DType::I32 => "I32",
            DType::I64 => "I64",
            DType::Bool => "Bool",
        })
    }
}

impl DType {
    /// Width of one element in bytes
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        match self {
            DType::BF16 => core::mem::size_of::<bf16>(),
            DType::F16 => core::mem::size_of::<f16>(),
            DType::F32 => 4,
            DType::F64 => 8,
            DType::U8 => 1,
            DType::I8 => 1,
            DType::I16 => 2,
            DType::I32 => 4,
            DType::I64 => 8,
            DType::Bool => 1,
        }
    }

    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, DType::BF16 | DType::F16 | DType::F32 | DType::F64)
    }
}

// Widest scalar, every allocation is padded to a multiple of it
pub(crate) const MAX_SCALAR_SIZE: usize = core::mem::size_of::<u64>();

#[test]
fn widest_dtype_fits_alignment() {
    for dtype in [
        DType::BF16, DType::F16, DType::F32, DType::F64, DType::U8,
        DType::I8, DType::I16, DType::I32, DType::I64, DType::Bool,
    ] {
        assert!(dtype.byte_size() <= MAX_SCALAR_SIZE);
        assert_eq!(MAX_SCALAR_SIZE % dtype.byte_size(), 0);
    }
}
