//! Array Container Layout
//!
//! The native binary layout for an array value, a bit-exact contract other
//! collaborators must honor:
//!
//! ```text
//! offset 0   i32  ndim          (1 or 2)
//! offset 4   i32  data_offset   (0 iff no null bitmap)
//! offset 8   u32  elem_type     (element type id)
//! offset 12  i32  dims[ndim]    (per-dimension extents)
//!            i32  lbounds[ndim] (per-dimension lower bounds)
//!            u8   bitmap[ceil(n/8)]   -- present only when nullable
//!            ...  padding to the element alignment
//!            ...  element data, nulls occupy no storage
//! ```
//!
//! Integers are native-endian fixed-width. Element data is compacted:
//! a null position consumes a bitmap bit and nothing else, so the k-th
//! non-null element sits at `k` strides into the data (fixed-width case).
//!
//! Containers are allocated into a caller-specified native memory region
//! and freed when that region ends, never individually.

use crate::bitmap::NullBitmap;
use crate::error::{BridgeError, BridgeResult};

/// Byte offset where the dims array starts.
const HEADER_FIXED: usize = 12;

/// Most dimensions a container can carry. A real limitation, preserved:
/// the marshaller fails fast rather than generalizing.
pub const MAX_NDIM: usize = 2;

/// Element storage width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemSize {
    /// Fixed-width element of the given byte size
    Fixed(usize),
    /// Variable-width element (u32 length prefix + payload)
    Variable,
}

/// Byte-layout traits of an element type, the subset of a type descriptor
/// the container codec needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElemLayout {
    /// Element type id stored in the header
    pub type_id: u32,
    /// Storage width
    pub size: ElemSize,
    /// Alignment requirement in bytes
    pub align: usize,
    /// Whether element values pass by value in a datum
    pub by_value: bool,
}

fn align_up(off: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (off + align - 1) & !(align - 1)
}

fn header_len(ndim: usize) -> usize {
    HEADER_FIXED + 2 * 4 * ndim
}

fn check_dims(dims: &[i32], lbounds: &[i32]) -> BridgeResult<usize> {
    if dims.is_empty() || dims.len() > MAX_NDIM {
        return Err(BridgeError::shape(format!(
            "{} dimensions, at most {MAX_NDIM} supported",
            dims.len()
        )));
    }
    if lbounds.len() != dims.len() {
        return Err(BridgeError::shape("lower bound count differs from ndim"));
    }
    let mut n: usize = 1;
    for &d in dims {
        if d < 0 {
            return Err(BridgeError::shape(format!("negative extent {d}")));
        }
        n *= d as usize;
    }
    Ok(n)
}

// ============================================================================
// Owned container
// ============================================================================

/// An owned, fully built array container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayBuf {
    bytes: Vec<u8>,
    /// Cached offset of the data area; the header stores it only when a
    /// bitmap is present (`data_offset == 0` is the no-bitmap marker).
    data_start: usize,
}

impl ArrayBuf {
    /// Allocate a container for `dims` fixed-width elements with zeroed,
    /// uncompacted data. The caller fills [`ArrayBuf::data_mut`] with one
    /// bulk copy; when `with_nulls` is set the bitmap is laid out (all
    /// positions present) so readers see a consistent container.
    ///
    /// Element-wise null marking goes through [`ArrayBuf::construct`]
    /// instead; this path exists for the contiguous no-null fast case.
    pub fn build_fixed(
        dims: &[i32],
        lbounds: &[i32],
        elem: &ElemLayout,
        with_nulls: bool,
    ) -> BridgeResult<ArrayBuf> {
        let nelems = check_dims(dims, lbounds)?;
        let size = match elem.size {
            ElemSize::Fixed(s) => s,
            ElemSize::Variable => {
                return Err(BridgeError::malformed(
                    "bulk container build requires a fixed-width element",
                ))
            }
        };

        let hdr = header_len(dims.len());
        let bitmap_len = if with_nulls {
            NullBitmap::byte_len(nelems)
        } else {
            0
        };
        let data_start = align_up(hdr + bitmap_len, elem.align);
        let mut bytes = vec![0u8; data_start + nelems * size];

        write_header(
            &mut bytes,
            dims,
            lbounds,
            elem.type_id,
            if with_nulls { data_start } else { 0 },
        );
        if with_nulls {
            let bm = NullBitmap::all_present(nelems);
            bytes[hdr..hdr + bitmap_len].copy_from_slice(bm.as_bytes());
        }
        Ok(ArrayBuf { bytes, data_start })
    }

    /// Build a container in one shot from flattened scratch slots: element
    /// bytes when present, `None` when null. Nulls consume a bitmap bit
    /// and no data storage. Variable-width elements are walked with their
    /// own length and aligned per `elem.align`; a fixed stride is never
    /// assumed.
    pub fn construct(
        dims: &[i32],
        lbounds: &[i32],
        elems: &[Option<Vec<u8>>],
        elem: &ElemLayout,
    ) -> BridgeResult<ArrayBuf> {
        let nelems = check_dims(dims, lbounds)?;
        if elems.len() != nelems {
            return Err(BridgeError::shape(format!(
                "{} scratch slots for {nelems} logical elements",
                elems.len()
            )));
        }
        let with_nulls = elems.iter().any(Option::is_none);

        let hdr = header_len(dims.len());
        let bitmap_len = if with_nulls {
            NullBitmap::byte_len(nelems)
        } else {
            0
        };
        let data_start = align_up(hdr + bitmap_len, elem.align);

        // Size the data area first so the buffer is allocated once.
        let mut data_len = 0usize;
        for slot in elems.iter().flatten() {
            if let ElemSize::Fixed(s) = elem.size {
                if slot.len() != s {
                    return Err(BridgeError::malformed(format!(
                        "element of {} bytes where {s} expected",
                        slot.len()
                    )));
                }
            }
            data_len = align_up(data_len, elem.align) + slot.len();
        }

        let mut bytes = vec![0u8; data_start + data_len];
        write_header(
            &mut bytes,
            dims,
            lbounds,
            elem.type_id,
            if with_nulls { data_start } else { 0 },
        );

        let mut bm = NullBitmap::new(nelems);
        let mut cursor = 0usize;
        for (i, slot) in elems.iter().enumerate() {
            match slot {
                None => bm.set_null(i),
                Some(v) => {
                    bm.set_present(i);
                    cursor = align_up(cursor, elem.align);
                    bytes[data_start + cursor..data_start + cursor + v.len()]
                        .copy_from_slice(v);
                    cursor += v.len();
                }
            }
        }
        if with_nulls {
            bytes[hdr..hdr + bitmap_len].copy_from_slice(bm.as_bytes());
        }
        Ok(ArrayBuf { bytes, data_start })
    }

    /// Read view over this container.
    pub fn view(&self) -> ArrayView<'_> {
        // A buffer we built ourselves always parses.
        ArrayView::parse(&self.bytes).expect("self-built container is well formed")
    }

    /// Mutable access to the element data area (bulk-fill path).
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.data_start..]
    }

    /// The raw container bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the raw container bytes, for storing into a region.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn write_header(bytes: &mut [u8], dims: &[i32], lbounds: &[i32], elem_type: u32, data_offset: usize) {
    let ndim = dims.len();
    bytes[0..4].copy_from_slice(&(ndim as i32).to_ne_bytes());
    bytes[4..8].copy_from_slice(&(data_offset as i32).to_ne_bytes());
    bytes[8..12].copy_from_slice(&elem_type.to_ne_bytes());
    for (i, &d) in dims.iter().enumerate() {
        let at = HEADER_FIXED + 4 * i;
        bytes[at..at + 4].copy_from_slice(&d.to_ne_bytes());
    }
    for (i, &lb) in lbounds.iter().enumerate() {
        let at = HEADER_FIXED + 4 * (ndim + i);
        bytes[at..at + 4].copy_from_slice(&lb.to_ne_bytes());
    }
}

// ============================================================================
// Read view
// ============================================================================

/// Parsed, validated view over container bytes.
#[derive(Debug, Clone, Copy)]
pub struct ArrayView<'a> {
    bytes: &'a [u8],
    ndim: usize,
    nelems: usize,
    data_offset: usize,
}

impl<'a> ArrayView<'a> {
    /// Parse and validate a container. Dimensionality above [`MAX_NDIM`]
    /// fails fast as a shape error; structural damage is reported as
    /// malformed.
    pub fn parse(bytes: &'a [u8]) -> BridgeResult<ArrayView<'a>> {
        if bytes.len() < HEADER_FIXED {
            return Err(BridgeError::malformed("container shorter than header"));
        }
        let ndim = i32::from_ne_bytes(bytes[0..4].try_into().expect("4 bytes"));
        if ndim < 1 || ndim as usize > MAX_NDIM {
            return Err(BridgeError::shape(format!(
                "{ndim} dimensions, at most {MAX_NDIM} supported"
            )));
        }
        let ndim = ndim as usize;
        if bytes.len() < header_len(ndim) {
            return Err(BridgeError::malformed("container truncated in header"));
        }
        let data_offset = i32::from_ne_bytes(bytes[4..8].try_into().expect("4 bytes"));
        if data_offset < 0 || data_offset as usize > bytes.len() {
            return Err(BridgeError::malformed("data offset out of range"));
        }

        let mut nelems: usize = 1;
        for i in 0..ndim {
            let at = HEADER_FIXED + 4 * i;
            let d = i32::from_ne_bytes(bytes[at..at + 4].try_into().expect("4 bytes"));
            if d < 0 {
                return Err(BridgeError::malformed(format!("negative extent {d}")));
            }
            nelems *= d as usize;
        }

        let view = ArrayView {
            bytes,
            ndim,
            nelems,
            data_offset: data_offset as usize,
        };
        if view.has_nulls() && view.data_offset < header_len(ndim) + NullBitmap::byte_len(nelems)
        {
            return Err(BridgeError::malformed("bitmap overlaps data"));
        }
        Ok(view)
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Per-dimension extents.
    pub fn dims(&self) -> Vec<i32> {
        (0..self.ndim)
            .map(|i| {
                let at = HEADER_FIXED + 4 * i;
                i32::from_ne_bytes(self.bytes[at..at + 4].try_into().expect("4 bytes"))
            })
            .collect()
    }

    /// Per-dimension lower bounds.
    pub fn lbounds(&self) -> Vec<i32> {
        (0..self.ndim)
            .map(|i| {
                let at = HEADER_FIXED + 4 * (self.ndim + i);
                i32::from_ne_bytes(self.bytes[at..at + 4].try_into().expect("4 bytes"))
            })
            .collect()
    }

    /// Element type id from the header.
    pub fn elem_type(&self) -> u32 {
        u32::from_ne_bytes(self.bytes[8..12].try_into().expect("4 bytes"))
    }

    /// Total logical element count (product of extents).
    pub fn nelems(&self) -> usize {
        self.nelems
    }

    /// Whether a null bitmap is present (`data_offset != 0`).
    pub fn has_nulls(&self) -> bool {
        self.data_offset != 0
    }

    /// The null bitmap, if present.
    pub fn bitmap(&self) -> Option<NullBitmap> {
        if !self.has_nulls() {
            return None;
        }
        let at = header_len(self.ndim);
        Some(NullBitmap::from_bytes(
            &self.bytes[at..at + NullBitmap::byte_len(self.nelems)],
            self.nelems,
        ))
    }

    /// Element data area for a known element layout. When no bitmap is
    /// present the stored offset is 0, so the start is recomputed from the
    /// header length and the element alignment.
    pub fn data_with(&self, elem: &ElemLayout) -> &'a [u8] {
        let start = if self.data_offset != 0 {
            self.data_offset
        } else {
            align_up(header_len(self.ndim), elem.align)
        };
        &self.bytes[start.min(self.bytes.len())..]
    }

    /// Walk the element data, yielding `None` for null positions and the
    /// element's byte slice otherwise. Variable-width elements advance by
    /// their own runtime length plus alignment; fixed-width elements by
    /// their stride.
    pub fn elements(&self, elem: &ElemLayout) -> BridgeResult<Vec<Option<&'a [u8]>>> {
        let bitmap = self.bitmap();
        let data = self.data_with(elem);
        let mut out = Vec::with_capacity(self.nelems);
        let mut cursor = 0usize;
        for i in 0..self.nelems {
            if bitmap.as_ref().is_some_and(|bm| bm.is_null(i)) {
                out.push(None);
                continue;
            }
            cursor = align_up(cursor, elem.align);
            let len = match elem.size {
                ElemSize::Fixed(s) => s,
                ElemSize::Variable => {
                    if cursor + 4 > data.len() {
                        return Err(BridgeError::malformed("truncated element length"));
                    }
                    let payload = u32::from_ne_bytes(
                        data[cursor..cursor + 4].try_into().expect("4 bytes"),
                    ) as usize;
                    4 + payload
                }
            };
            if cursor + len > data.len() {
                return Err(BridgeError::malformed("element data out of range"));
            }
            out.push(Some(&data[cursor..cursor + len]));
            cursor += len;
        }
        Ok(out)
    }
}
