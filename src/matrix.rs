use std::ops::Mul;

use num_complex::Complex;

use crate::{
    controls::Controls,
    error::{Result, SimError},
};

/// A square complex matrix acting on a whole number of qubits, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    size: usize,
    data: Vec<Complex<f64>>,
}
impl Matrix {
    /// A `size × size` matrix from row-major entries.
    ///
    /// `size` must be a power of two so the matrix acts on whole qubits.
    pub fn new(size: usize, data: Vec<Complex<f64>>) -> Result<Matrix> {
        if !size.is_power_of_two() || data.len() != size * size {
            return Err(SimError::InvalidMatrixShape {
                rows: size,
                cols: data.len().checked_div(size).unwrap_or(0),
            });
        }
        Ok(Matrix { size, data })
    }

    pub fn from_rows(rows: &[&[Complex<f64>]]) -> Result<Matrix> {
        let size = rows.len();
        if let Some(row) = rows.iter().find(|r| r.len() != size) {
            return Err(SimError::InvalidMatrixShape {
                rows: size,
                cols: row.len(),
            });
        }
        Matrix::new(size, rows.concat())
    }

    pub fn identity(size: usize) -> Matrix {
        Matrix::permutation(size, |e| e)
    }

    /// The permutation matrix sending basis state `e` to `f(e)`.
    pub fn permutation(size: usize, f: impl Fn(usize) -> usize) -> Matrix {
        let mut data = vec![Complex::ZERO; size * size];
        for col in 0..size {
            let row = f(col) % size;
            data[row * size + col] = Complex::ONE;
        }
        Matrix { size, data }
    }

    pub fn pauli_x() -> Matrix {
        Matrix::permutation(2, |e| e ^ 1)
    }

    pub fn pauli_y() -> Matrix {
        Matrix {
            size: 2,
            data: vec![Complex::ZERO, -Complex::I, Complex::I, Complex::ZERO],
        }
    }

    pub fn pauli_z() -> Matrix {
        Matrix {
            size: 2,
            data: vec![Complex::ONE, Complex::ZERO, Complex::ZERO, -Complex::ONE],
        }
    }

    pub fn hadamard() -> Matrix {
        let s = Complex::from(std::f64::consts::FRAC_1_SQRT_2);
        Matrix {
            size: 2,
            data: vec![s, s, s, -s],
        }
    }

    /// Adds `amount` modulo `2^span` to the basis index.
    pub fn offset_matrix(span: u32, amount: i64) -> Matrix {
        let size = 1usize << span;
        Matrix::permutation(size, |e| (e as i64 + amount).rem_euclid(size as i64) as usize)
    }

    /// Rotates the `span` index bits left by `shift`.
    pub fn cycle_bits_matrix(span: u32, shift: i64) -> Matrix {
        let size = 1usize << span;
        let shift = shift.rem_euclid(i64::from(span.max(1))) as u32;
        Matrix::permutation(size, |e| {
            if shift == 0 {
                return e;
            }
            ((e << shift) | (e >> (span - shift))) & (size - 1)
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of qubits the matrix acts on.
    pub fn qubit_span(&self) -> u32 {
        self.size.ilog2()
    }

    pub fn get(&self, row: usize, col: usize) -> Complex<f64> {
        self.data[row * self.size + col]
    }

    pub fn entries(&self) -> &[Complex<f64>] {
        &self.data
    }

    /// Interleaved `(re, im)` pairs in row-major order, the layout of a matrix texture.
    pub fn to_texture_data(&self) -> Vec<f32> {
        self.data
            .iter()
            .flat_map(|c| [c.re as f32, c.im as f32])
            .collect()
    }

    /// Reference (host-side) application of the matrix to the qubits starting at `qubit`
    /// of a full state vector, restricted to the basis states `controls` allows.
    pub fn apply_to_state_vector_at_qubit_with_controls(
        &self,
        state: &[Complex<f64>],
        qubit: u32,
        controls: Controls,
    ) -> Vec<Complex<f64>> {
        let field = (self.size - 1) << qubit;
        (0..state.len())
            .map(|k| {
                if !controls.allows_state(k as u32) {
                    return state[k];
                }
                let row = (k & field) >> qubit;
                let base = k & !field;
                (0..self.size)
                    .map(|col| self.get(row, col) * state[base | (col << qubit)])
                    .sum()
            })
            .collect()
    }
}
impl Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: &Matrix) -> Matrix {
        assert_eq!(self.size, rhs.size, "matrix sizes differ");
        let n = self.size;
        let mut data = vec![Complex::ZERO; n * n];
        for row in 0..n {
            for col in 0..n {
                data[row * n + col] = (0..n).map(|i| self.get(row, i) * rhs.get(i, col)).sum();
            }
        }
        Matrix { size: n, data }
    }
}
