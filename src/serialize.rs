//! Flat and serde representations of predictor weights.
//!
//! A flat weight vector is the input→hidden matrix in row-major order followed by the
//! hidden→output matrix in row-major order, which is how models are handed to storage.

use crate::error::{Error, Result};
use rulinalg::matrix::{BaseMatrix, Matrix};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of weights in a network of the given shape
#[inline]
pub const fn weight_count(input: usize, hidden: usize, output: usize) -> usize {
    hidden * input + output * hidden
}

/// Flatten both weight matrices into one vector
pub fn flatten(input_hidden: &Matrix<f64>, hidden_output: &Matrix<f64>) -> Vec<f64> {
    let mut flat = Vec::with_capacity(input_hidden.data().len() + hidden_output.data().len());
    flat.extend_from_slice(input_hidden.data());
    flat.extend_from_slice(hidden_output.data());
    flat
}

/// Rebuild `(input_hidden, hidden_output)` from a flat vector, where input_hidden is
/// `hidden x input` and hidden_output is `output x hidden`
pub fn unflatten(
    flat: &[f64],
    input: usize,
    hidden: usize,
    output: usize,
) -> Result<(Matrix<f64>, Matrix<f64>)> {
    let expected = weight_count(input, hidden, output);
    if flat.len() != expected {
        return Err(Error::WeightCount {
            input,
            hidden,
            output,
            expected,
            actual: flat.len(),
        });
    }

    let (ih, ho) = flat.split_at(hidden * input);
    Ok((
        Matrix::new(hidden, input, ih.to_vec()),
        Matrix::new(output, hidden, ho.to_vec()),
    ))
}

#[derive(Serialize, Deserialize)]
struct MatrixBits {
    rows: usize,
    cols: usize,
    bits: Vec<u64>,
}

pub fn serialize_matrix<S: Serializer>(
    matrix: &Matrix<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    // Convert f64 values to u64 bits for precise serialization
    MatrixBits {
        rows: matrix.rows(),
        cols: matrix.cols(),
        bits: matrix.data().iter().map(|&f| f64::to_bits(f)).collect(),
    }
    .serialize(serializer)
}

pub fn deserialize_matrix<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Matrix<f64>, D::Error> {
    let MatrixBits { rows, cols, bits } = MatrixBits::deserialize(deserializer)?;
    if rows * cols != bits.len() {
        return Err(serde::de::Error::custom(format!(
            "{rows}x{cols} matrix can't hold {} values",
            bits.len()
        )));
    }

    // Convert u64 bits back to f64 values
    Ok(Matrix::new(
        rows,
        cols,
        bits.into_iter().map(f64::from_bits).collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::random::WyRng;
    use rand::Rng;

    fn random_matrix(rows: usize, cols: usize, rng: &mut impl Rng) -> Matrix<f64> {
        Matrix::new(
            rows,
            cols,
            (0..rows * cols)
                .map(|_| rng.random_range(-3.0..3.0))
                .collect::<Vec<f64>>(),
        )
    }

    #[test]
    fn test_round_trip_bit_identical() {
        let mut rng = WyRng::seeded(11);
        for (i, h, o) in [(8, 12, 4), (1, 1, 1), (3, 7, 2), (16, 2, 9)] {
            let ih = random_matrix(h, i, &mut rng);
            let ho = random_matrix(o, h, &mut rng);
            let flat = flatten(&ih, &ho);
            assert_eq!(flat.len(), weight_count(i, h, o));

            let (ih_back, ho_back) = unflatten(&flat, i, h, o).unwrap();
            assert_eq!((ih_back.rows(), ih_back.cols()), (h, i));
            assert_eq!((ho_back.rows(), ho_back.cols()), (o, h));
            for (l, r) in ih.data().iter().zip(ih_back.data()) {
                assert_eq!(l.to_bits(), r.to_bits());
            }
            for (l, r) in ho.data().iter().zip(ho_back.data()) {
                assert_eq!(l.to_bits(), r.to_bits());
            }
        }
    }

    #[test]
    fn test_unflatten_wrong_length() {
        match unflatten(&[0.; 10], 8, 12, 4) {
            Err(Error::WeightCount {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 144);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_serde_matrix_keeps_nan_and_shape() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            #[serde(
                serialize_with = "serialize_matrix",
                deserialize_with = "deserialize_matrix"
            )]
            m: Matrix<f64>,
        }

        let holder = Holder {
            m: Matrix::new(2, 3, vec![0.1, -0.0, f64::NAN, 1e300, -2.5, 3.0]),
        };
        let json = serde_json::to_string(&holder).unwrap();
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!((back.m.rows(), back.m.cols()), (2, 3));
        for (l, r) in holder.m.data().iter().zip(back.m.data()) {
            assert_eq!(l.to_bits(), r.to_bits());
        }
    }

    #[test]
    fn test_serde_matrix_rejects_bad_shape() {
        let json = r#"{"rows":2,"cols":2,"bits":[0,0,0]}"#;
        let result: serde_json::Result<MatrixBits> = serde_json::from_str(json);
        assert!(result.is_ok());
        let mut de = serde_json::Deserializer::from_str(json);
        assert!(deserialize_matrix(&mut de).is_err());
    }
}
