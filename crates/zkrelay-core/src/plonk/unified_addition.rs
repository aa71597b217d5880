//! Unified (complete) elliptic-curve addition gate over Pallas.
//!
//! Eleven cells per row: `x1 y1 x2 y2 x3 y3 λ α β γ δ`. The point at
//! infinity is encoded as `(0, 0)`, which is not on `y² = x³ + 5`.
//! The twelve constraints hold iff `(x3, y3) = (x1, y1) + (x2, y2)`,
//! covering the generic case, doubling, `P + (−P) = O` and either
//! operand being `O`. The auxiliary witnesses are
//!
//! - `λ`: the slope, `(y2 − y1)/(x2 − x1)`, or `3x1²/2y1` when doubling
//! - `α`: `1/(x2 − x1)` or 0
//! - `β`: `1/x1` or 0
//! - `γ`: `1/x2` or 0
//! - `δ`: `1/(y1 + y2)` when `x1 = x2` and `y1 ≠ −y2`, otherwise 0

use pasta_curves::arithmetic::{Coordinates, CurveAffine};
use pasta_curves::group::ff::Field;
use pasta_curves::pallas;

use super::field::Fp;
use super::gate::{CellRef, Evaluations, Gate, GateError};

/// Number of cells the gate reads.
pub const UNIFIED_ADDITION_WIDTH: usize = 11;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnifiedAdditionGate {
    layout: [CellRef; UNIFIED_ADDITION_WIDTH],
}

impl UnifiedAdditionGate {
    /// Cells in columns `base..base + 11`, all at rotation 0.
    pub fn new(base_column: usize) -> Self {
        let mut layout = [CellRef::new(0, 0); UNIFIED_ADDITION_WIDTH];
        for (i, cell) in layout.iter_mut().enumerate() {
            *cell = CellRef::new(base_column + i, 0);
        }
        Self { layout }
    }

    /// Arbitrary placement, e.g. the result point on the next row.
    pub fn with_layout(layout: [CellRef; UNIFIED_ADDITION_WIDTH]) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &[CellRef; UNIFIED_ADDITION_WIDTH] {
        &self.layout
    }
}

impl Default for UnifiedAdditionGate {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Gate for UnifiedAdditionGate {
    fn name(&self) -> &'static str {
        "unified_addition"
    }

    fn cells(&self) -> Vec<CellRef> {
        self.layout.to_vec()
    }

    fn constraints(&self, evals: &Evaluations<'_>) -> Result<Vec<Fp>, GateError> {
        let mut w = [Fp::ZERO; UNIFIED_ADDITION_WIDTH];
        for (value, cell) in w.iter_mut().zip(self.layout.iter()) {
            *value = evals.get(*cell)?;
        }
        Ok(addition_constraints(&w).to_vec())
    }
}

fn addition_constraints(w: &[Fp; UNIFIED_ADDITION_WIDTH]) -> [Fp; 12] {
    let [x1, y1, x2, y2, x3, y3, lambda, alpha, beta, gamma, delta] = *w;
    let two = Fp::from(2u64);
    let three = Fp::from(3u64);

    let dx = x2 - x1;
    let sy = y2 + y1;
    let slope_x = lambda.square() - x1 - x2 - x3;
    let slope_y = lambda * (x1 - x3) - y1 - y3;
    let x1_zero = Fp::ONE - x1 * beta;
    let x2_zero = Fp::ONE - x2 * gamma;
    let result_zero = Fp::ONE - dx * alpha - sy * delta;

    [
        dx * (dx * lambda - (y2 - y1)),
        (Fp::ONE - dx * alpha) * sy * (two * y1 * lambda - three * x1.square()),
        x1 * x2 * dx * slope_x,
        x1 * x2 * dx * slope_y,
        x1 * x2 * sy * slope_x,
        x1 * x2 * sy * slope_y,
        x1_zero * (x3 - x2),
        x1_zero * (y3 - y2),
        x2_zero * (x3 - x1),
        x2_zero * (y3 - y1),
        result_zero * x3,
        result_zero * y3,
    ]
}

/// Affine coordinates with the point at infinity mapped to `(0, 0)`.
pub fn coordinates(point: &pallas::Affine) -> (Fp, Fp) {
    let coords: Option<Coordinates<pallas::Affine>> = point.coordinates().into();
    coords
        .map(|c| (*c.x(), *c.y()))
        .unwrap_or((Fp::ZERO, Fp::ZERO))
}

/// Assign the eleven gate cells for `p + q`.
pub fn assign(p: &pallas::Affine, q: &pallas::Affine) -> [Fp; UNIFIED_ADDITION_WIDTH] {
    let (x1, y1) = coordinates(p);
    let (x2, y2) = coordinates(q);
    assign_coordinates(x1, y1, x2, y2)
}

/// Same as [`assign`] on raw coordinates (`(0, 0)` is the point at infinity).
pub fn assign_coordinates(x1: Fp, y1: Fp, x2: Fp, y2: Fp) -> [Fp; UNIFIED_ADDITION_WIDTH] {
    let invert = |v: Fp| v.invert().unwrap_or(Fp::ZERO);
    let p_is_zero = x1 == Fp::ZERO && y1 == Fp::ZERO;
    let q_is_zero = x2 == Fp::ZERO && y2 == Fp::ZERO;

    let lambda = if x1 != x2 {
        (y2 - y1) * invert(x2 - x1)
    } else if y1 + y2 != Fp::ZERO {
        Fp::from(3u64) * x1.square() * invert(Fp::from(2u64) * y1)
    } else {
        Fp::ZERO
    };

    let (x3, y3) = if p_is_zero {
        (x2, y2)
    } else if q_is_zero {
        (x1, y1)
    } else if x1 == x2 && y1 + y2 == Fp::ZERO {
        (Fp::ZERO, Fp::ZERO)
    } else {
        let x3 = lambda.square() - x1 - x2;
        (x3, lambda * (x1 - x3) - y1)
    };

    let delta = if x1 == x2 && y1 + y2 != Fp::ZERO {
        invert(y1 + y2)
    } else {
        Fp::ZERO
    };

    [
        x1,
        y1,
        x2,
        y2,
        x3,
        y3,
        lambda,
        invert(x2 - x1),
        invert(x1),
        invert(x2),
        delta,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plonk::gate::ColumnsRotations;
    use pasta_curves::group::{Curve, Group};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn point(k: u64) -> pallas::Point {
        pallas::Point::generator() * pallas::Scalar::from(k)
    }

    fn residuals(w: &[Fp; UNIFIED_ADDITION_WIDTH]) -> Vec<Fp> {
        let values: Vec<Vec<Fp>> = w.iter().map(|v| vec![*v]).collect();
        let rotations = ColumnsRotations::uniform(UNIFIED_ADDITION_WIDTH);
        UnifiedAdditionGate::default()
            .constraints(&Evaluations::new(&values, &rotations))
            .unwrap()
    }

    fn all_zero(residuals: &[Fp]) -> bool {
        residuals.iter().all(|r| *r == Fp::ZERO)
    }

    fn check_sum(p: pallas::Point, q: pallas::Point) {
        let w = assign(&p.to_affine(), &q.to_affine());
        let expected = coordinates(&(p + q).to_affine());
        assert_eq!((w[4], w[5]), expected, "assigned sum differs from group law");
        assert!(all_zero(&residuals(&w)), "honest assignment violates the gate");
    }

    #[test]
    fn test_generic_addition_satisfies_gate() {
        check_sum(point(3), point(11));
    }

    #[test]
    fn test_doubling_satisfies_gate() {
        check_sum(point(7), point(7));
    }

    #[test]
    fn test_inverse_points_sum_to_infinity() {
        check_sum(point(5), -point(5));
    }

    #[test]
    fn test_inverse_points_leave_doubling_slope_unconstrained() {
        // x1 = x2 with y1 = −y2: λ is free, the sum is still pinned to O.
        let p = point(5);
        for k in [1u64, 2, 13, 1 << 40] {
            let q = -point(k);
            let mut w = assign(&point(k).to_affine(), &q.to_affine());
            w[6] = Fp::from(k + 17);
            assert!(all_zero(&residuals(&w)), "k = {k}");
        }

        let mut w = assign(&p.to_affine(), &(-p).to_affine());
        let (x, y) = coordinates(&p.to_affine());
        w[4] = x;
        w[5] = y;
        assert!(!all_zero(&residuals(&w)));
    }

    #[test]
    fn test_infinity_operands() {
        let identity = pallas::Point::identity();
        check_sum(identity, point(9));
        check_sum(point(9), identity);
        check_sum(identity, identity);
    }

    #[test]
    fn test_random_points_satisfy_gate() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..16 {
            check_sum(pallas::Point::random(&mut rng), pallas::Point::random(&mut rng));
        }
    }

    #[test]
    fn test_wrong_result_is_rejected() {
        let mut w = assign(&point(3).to_affine(), &point(11).to_affine());
        let (x, y) = coordinates(&point(15).to_affine());
        w[4] = x;
        w[5] = y;
        assert!(!all_zero(&residuals(&w)));
    }

    #[test]
    fn test_wrong_doubling_result_is_rejected() {
        let mut w = assign(&point(7).to_affine(), &point(7).to_affine());
        w[5] = -w[5];
        assert!(!all_zero(&residuals(&w)));
    }

    #[test]
    fn test_claiming_infinity_for_distinct_points_is_rejected() {
        let mut w = assign(&point(2).to_affine(), &point(3).to_affine());
        w[4] = Fp::ZERO;
        w[5] = Fp::ZERO;
        assert!(!all_zero(&residuals(&w)));
    }

    #[test]
    fn test_folded_evaluation_matches_constraints() {
        let w = assign(&point(4).to_affine(), &point(6).to_affine());
        let values: Vec<Vec<Fp>> = w.iter().map(|v| vec![*v]).collect();
        let rotations = ColumnsRotations::uniform(UNIFIED_ADDITION_WIDTH);
        let evals = Evaluations::new(&values, &rotations);
        let gate = UnifiedAdditionGate::default();
        assert_eq!(gate.evaluate(&evals, Fp::from(99u64)).unwrap(), Fp::ZERO);

        let mut bad = values.clone();
        bad[6][0] += Fp::ONE;
        let evals = Evaluations::new(&bad, &rotations);
        assert_ne!(gate.evaluate(&evals, Fp::from(99u64)).unwrap(), Fp::ZERO);
    }

    #[test]
    fn test_result_on_next_row_layout() {
        // x3, y3 read from the following row of columns 0 and 1.
        let mut layout = [CellRef::new(0, 0); UNIFIED_ADDITION_WIDTH];
        let columns = [0usize, 1, 2, 3, 0, 1, 4, 5, 6, 7, 8];
        for (i, cell) in layout.iter_mut().enumerate() {
            let rotation = if i == 4 || i == 5 { 1 } else { 0 };
            *cell = CellRef::new(columns[i], rotation);
        }
        let gate = UnifiedAdditionGate::with_layout(layout);

        let w = assign(&point(2).to_affine(), &point(5).to_affine());
        let values = vec![
            vec![w[0], w[4]],
            vec![w[1], w[5]],
            vec![w[2]],
            vec![w[3]],
            vec![w[6]],
            vec![w[7]],
            vec![w[8]],
            vec![w[9]],
            vec![w[10]],
        ];
        let rotations = ColumnsRotations(vec![
            vec![0, 1],
            vec![0, 1],
            vec![0],
            vec![0],
            vec![0],
            vec![0],
            vec![0],
            vec![0],
            vec![0],
        ]);
        let residuals = gate
            .constraints(&Evaluations::new(&values, &rotations))
            .unwrap();
        assert!(all_zero(&residuals));
    }
}
