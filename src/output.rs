//! Minimal NumPy `.npy` (format version 1.0) writer for the fitted tensors,
//! so the downstream exporters keep consuming the same artifacts the
//! original pipeline produced. Values are written as little-endian f32 in C
//! order; matrices are stored row-major.

use std::{fs::File, io::{BufWriter, Write}, path::Path};

use itertools::Itertools;

use crate::{Real, Result, lut::LtcTable, vec::mat_at};

const MAGIC: &[u8] = b"\x93NUMPY";

fn header_dict(shape: &[usize]) -> String {
    let dims = shape.iter().map(ToString::to_string).join(", ");
    let tuple = if shape.len() == 1 {
        format!("({dims},)")
    } else {
        format!("({dims})")
    };
    format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {tuple}, }}")
}

/// Write one dense f32 tensor as a `.npy` file.
pub fn save_npy(path: &Path, shape: &[usize], data: &[f32]) -> Result<()> {
    debug_assert_eq!(shape.iter().product::<usize>(), data.len());

    // Pad the header with spaces so the data section starts on a 64-byte
    // boundary, as the format requires.
    let mut dict = header_dict(shape);
    let unpadded = MAGIC.len() + 4 + dict.len() + 1;
    dict.extend(std::iter::repeat_n(' ', (64 - unpadded % 64) % 64));
    dict.push('\n');

    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(MAGIC)?;
    w.write_all(&[0x01, 0x00])?;
    w.write_all(&u16::try_from(dict.len()).map_err(|_| {
        crate::Error::InvalidConfig(format!("npy header too large for {} dims", shape.len()))
    })?.to_le_bytes())?;
    w.write_all(dict.as_bytes())?;
    for value in data {
        w.write_all(&value.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Flatten the LUT into C order: cells in storage order, each matrix
/// row-major.
#[must_use]
pub fn lut_to_flat(table: &LtcTable) -> Vec<f32> {
    let mut flat = Vec::with_capacity(table.n_cells() * 9);
    for cell in 0..table.n_cells() {
        let m = table.mat(cell);
        for row in 0..3 {
            for col in 0..3 {
                flat.push(mat_at(m, row, col) as f32);
            }
        }
    }
    flat
}

/// Persist the LUT tensor with shape `[bins..., 3, 3]`.
pub fn save_table(path: &Path, table: &LtcTable) -> Result<()> {
    let mut shape = table.layout().shape();
    shape.extend([3, 3]);
    save_npy(path, &shape, &lut_to_flat(table))
}

/// Persist one per-cell scalar table with shape `[bins...]`.
pub fn save_scalars(path: &Path, table: &LtcTable, values: &[Real]) -> Result<()> {
    let flat: Vec<f32> = values.iter().map(|v| *v as f32).collect();
    save_npy(path, &table.layout().shape(), &flat)
}
