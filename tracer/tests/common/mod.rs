#![allow(dead_code)]

use memtrace::{test_utils::root_records, AccessType, TraceRecord};

pub fn of_kind(kind: AccessType) -> Vec<TraceRecord> {
    root_records()
        .into_iter()
        .filter(|record| record.kind == kind)
        .collect()
}

pub fn offsets(records: &[TraceRecord]) -> Vec<u64> {
    records.iter().map(|record| record.offset).collect()
}

/// Compressed sparse row matrix.
pub struct Csr {
    pub n_row: usize,
    pub n_col: usize,
    pub indptr: Vec<usize>,
    pub indices: Vec<usize>,
    pub data: Vec<f64>,
}

impl Csr {
    pub fn from_dense(rows: &[Vec<f64>]) -> Self {
        let mut indptr = vec![0];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        for row in rows {
            for (j, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    indices.push(j);
                    data.push(value);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            n_row: rows.len(),
            n_col: rows.first().map_or(0, Vec::len),
            indptr,
            indices,
            data,
        }
    }

    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        (0..self.n_row)
            .map(|i| {
                (self.indptr[i]..self.indptr[i + 1])
                    .map(|jj| self.data[jj] * x[self.indices[jj]])
                    .sum()
            })
            .collect()
    }
}
