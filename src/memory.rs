//! Foreign memory access for analysis data.
//!
//! `GetAnalysisItemAddress` hands back a raw address into a buffer owned by
//! the driver. This module is the only place that dereferences it: each call
//! copies `count` elements into an owned `Vec<f64>` and keeps no reference to
//! the foreign buffer afterwards. The buffer may be reallocated by the next
//! driver call, so the copy must happen before anything else is invoked.

use std::mem::size_of;

use crate::error::{WlmError, WlmResult};

/// Element type of an analysis axis, selected by its byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    /// 2 bytes, C `short`
    Short,
    /// 4 bytes, C `long` on the vendor platforms
    Long,
    /// 8 bytes, C `double`
    Double,
}

impl ItemType {
    /// Map a byte width reported by `GetAnalysisItemSize`.
    pub fn from_size(size: i64) -> Option<Self> {
        match size {
            2 => Some(Self::Short),
            4 => Some(Self::Long),
            8 => Some(Self::Double),
            _ => None,
        }
    }

    /// Width in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Short => size_of::<i16>(),
            Self::Long => size_of::<i32>(),
            Self::Double => size_of::<f64>(),
        }
    }
}

/// Copy `count` elements of `item` starting at `address` into owned memory.
///
/// `axis` only labels errors. A non-positive count yields an empty vector
/// without touching `address`. A count whose byte span does not fit the
/// address space fails with `AxisTooLarge` before anything is allocated.
///
/// # Safety
///
/// `address` must point to at least `count * item.size()` readable bytes that
/// stay valid and unmodified for the duration of this call. No alignment is
/// required.
pub unsafe fn read_foreign(
    axis: char,
    address: i64,
    item: ItemType,
    count: i64,
) -> WlmResult<Vec<f64>> {
    if count <= 0 {
        return Ok(Vec::new());
    }
    let too_large = || WlmError::AxisTooLarge { axis, count };
    let items = usize::try_from(count).map_err(|_| too_large())?;
    let stride = item.size();
    // the copy is widened to f64, so it is never smaller than the source
    let fits = |width: usize| {
        items
            .checked_mul(width)
            .filter(|&bytes| bytes <= isize::MAX as usize)
    };
    let span = fits(stride).ok_or_else(too_large)?;
    fits(size_of::<f64>()).ok_or_else(too_large)?;
    if address == 0 {
        return Err(WlmError::NullAddress { axis });
    }
    (address as usize).checked_add(span).ok_or_else(too_large)?;

    let base = address as usize as *const u8;
    let mut values = Vec::with_capacity(items);
    for i in 0..items {
        // SAFETY: the caller guarantees `count * stride` readable bytes at
        // `base`; read_unaligned copies without assuming alignment.
        let ptr = unsafe { base.add(i * stride) };
        let value = unsafe {
            match item {
                ItemType::Short => f64::from(std::ptr::read_unaligned(ptr.cast::<i16>())),
                ItemType::Long => f64::from(std::ptr::read_unaligned(ptr.cast::<i32>())),
                ItemType::Double => std::ptr::read_unaligned(ptr.cast::<f64>()),
            }
        };
        values.push(value);
    }
    Ok(values)
}
