//! Polynomial interpolation in Newton form, with first derivatives on
//! both the input and output sides.

/// Divided-difference interpolator over `N`-dimensional samples.
///
/// Samples may carry a first derivative (Hermite interpolation, used for
/// position/velocity trajectories) or not (plain Lagrange, used for
/// quaternion components). Abscissae must be strictly increasing.
pub(crate) struct Interpolator<const N: usize> {
    abscissae: Vec<f64>,
    coefficients: Vec<[f64; N]>,
}

impl<const N: usize> Interpolator<N> {
    /// Builds the Newton form of the interpolating polynomial.
    pub fn new(samples: &[(f64, [f64; N], Option<[f64; N]>)]) -> Self {
        // expand constrained nodes: a sample with a derivative appears
        // twice in the abscissa list
        let mut abscissae = Vec::new();
        let mut values: Vec<[f64; N]> = Vec::new();
        let mut pair_derivative: Vec<Option<[f64; N]>> = Vec::new();
        for (t, value, derivative) in samples {
            abscissae.push(*t);
            values.push(*value);
            if let Some(d) = derivative {
                pair_derivative.push(Some(*d));
                abscissae.push(*t);
                values.push(*value);
            }
            pair_derivative.push(None);
        }
        pair_derivative.pop();

        let m = abscissae.len();
        let mut coefficients = Vec::with_capacity(m);
        coefficients.push(values[0]);
        let mut column = values;
        for order in 1..m {
            let mut next = Vec::with_capacity(m - order);
            for i in 0..m - order {
                let dx = abscissae[i + order] - abscissae[i];
                let mut dd = [0.0; N];
                if order == 1 && dx == 0.0 {
                    // repeated node: the first divided difference is the
                    // sample derivative
                    dd = pair_derivative[i].unwrap_or([f64::NAN; N]);
                } else {
                    for k in 0..N {
                        dd[k] = (column[i + 1][k] - column[i][k]) / dx;
                    }
                }
                next.push(dd);
            }
            coefficients.push(next[0]);
            column = next;
        }

        Self {
            abscissae,
            coefficients,
        }
    }

    /// Value and first derivative of the polynomial at `t`.
    pub fn value_and_derivative(&self, t: f64) -> ([f64; N], [f64; N]) {
        let m = self.coefficients.len();
        let mut value = self.coefficients[m - 1];
        let mut derivative = [0.0; N];
        for i in (0..m - 1).rev() {
            let dt = t - self.abscissae[i];
            for k in 0..N {
                derivative[k] = derivative[k] * dt + value[k];
                value[k] = value[k] * dt + self.coefficients[i][k];
            }
        }
        (value, derivative)
    }
}
