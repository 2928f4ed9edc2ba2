use rand::Rng;

/// Roulette-wheel selection over a weighted set of values.
///
/// Weights are accumulated as they are added and do not have to sum to 1.
/// Selection draws a uniform value in `[0, total)` and returns the first
/// entry whose cumulative weight exceeds the draw, so each value comes up
/// with probability proportional to its weight.
#[derive(Debug, Clone)]
pub struct SelectionSet<T> {
    cumulative: Vec<f64>,
    values: Vec<T>,
    total: f64,
}

impl<T: Copy> SelectionSet<T> {
    pub fn new() -> Self {
        SelectionSet {
            cumulative: Vec::new(),
            values: Vec::new(),
            total: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.cumulative.clear();
        self.values.clear();
        self.total = 0.0;
    }

    /// Append a value with the given non-negative weight.
    pub fn add(&mut self, weight: f64, value: T) {
        self.total += weight;
        self.cumulative.push(self.total);
        self.values.push(value);
    }

    /// Draw one value, weighted by the entries' relative weights.
    ///
    /// If the uniform draw lands past every cumulative weight (a floating
    /// point edge when the draw is very close to the total), the last value
    /// is returned. Panics if the set is empty.
    pub fn roulette_select<R: Rng>(&self, rng: &mut R) -> T {
        let draw = rng.random_range(0.0..self.total);
        for (i, cumulative) in self.cumulative.iter().enumerate() {
            if draw < *cumulative {
                return self.values[i];
            }
        }
        self.values[self.values.len() - 1]
    }
}

impl<T: Copy> Default for SelectionSet<T> {
    fn default() -> Self {
        SelectionSet::new()
    }
}

pub fn gaussian(x: f64, mean: f64, std_dev: f64) -> f64 {
    1.0 / (2.0 * std_dev * std::f64::consts::PI.sqrt())
        * (-(x - mean).powi(2) / (2.0 * std_dev.powi(2))).exp()
}

pub fn bivariate_gaussian(x: f64, y: f64, mx: f64, my: f64, sx: f64, sy: f64) -> f64 {
    1.0 / (2.0 * std::f64::consts::PI * sx * sy)
        * (-((x - mx).powi(2) / sx.powi(2) + (y - my).powi(2) / sy.powi(2))).exp()
        / 2.0
}

/// Build a 1D offset set over `[min, max]` weighted by a Gaussian density.
/// The table is computed once here and never per draw.
pub fn gaussian_offsets(mean: f64, variance: f64, min: i32, max: i32) -> SelectionSet<i32> {
    let std_dev = variance.sqrt();
    let mut set = SelectionSet::new();
    for x in min..=max {
        set.add(gaussian(x as f64, mean, std_dev), x);
    }
    set
}

/// Build a 2D offset set over a `(2r+1)^2` window weighted by a bivariate
/// Gaussian density.
pub fn bivariate_gaussian_offsets(
    mx: f64,
    my: f64,
    vx: f64,
    vy: f64,
    radius: i32,
) -> SelectionSet<(i32, i32)> {
    let sx = vx.sqrt();
    let sy = vy.sqrt();
    let mut set = SelectionSet::new();
    for x in -radius..=radius {
        for y in -radius..=radius {
            set.add(bivariate_gaussian(x as f64, y as f64, mx, my, sx, sy), (x, y));
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use more_asserts::assert_lt;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn total_weight_accumulates() {
        let mut set = SelectionSet::new();
        set.add(1.0, 'a');
        set.add(1.0, 'b');
        set.add(2.0, 'c');
        assert_eq!(set.len(), 3);
        assert_abs_diff_eq!(set.total_weight(), 4.0);
    }

    #[test]
    fn single_entry_always_selected() {
        let mut set = SelectionSet::new();
        set.add(0.25, 7);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(set.roulette_select(&mut rng), 7);
        }
    }

    #[test]
    fn frequencies_follow_weights() {
        let mut set = SelectionSet::new();
        set.add(1.0, 0usize);
        set.add(1.0, 1);
        set.add(2.0, 2);

        let mut rng = StdRng::seed_from_u64(42);
        let draws = 100_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            let v = set.roulette_select(&mut rng);
            counts[v] += 1;
        }

        // The third value carries half the total weight.
        let third = counts[2] as f64 / draws as f64;
        assert_lt!((third - 0.5).abs(), 0.02);
        let first = counts[0] as f64 / draws as f64;
        assert_lt!((first - 0.25).abs(), 0.02);
    }

    #[test]
    fn never_selects_outside_the_set() {
        let mut set = SelectionSet::new();
        set.add(0.1, -3);
        set.add(0.0, -2); // zero weight entries stay in the table
        set.add(0.9, 3);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let v = set.roulette_select(&mut rng);
            assert!(v == -3 || v == -2 || v == 3);
        }
    }

    #[test]
    fn gaussian_offsets_centred_on_mean() {
        let set = gaussian_offsets(0.0, 3.0, -3, 3);
        assert_eq!(set.len(), 7);

        // Middle entry (offset 0) carries the largest single weight.
        let mut rng = StdRng::seed_from_u64(11);
        let draws = 50_000;
        let mut zero = 0usize;
        for _ in 0..draws {
            if set.roulette_select(&mut rng) == 0 {
                zero += 1;
            }
        }
        let expected = gaussian(0.0, 0.0, 3.0f64.sqrt()) / set.total_weight();
        let observed = zero as f64 / draws as f64;
        assert_lt!((observed - expected).abs(), 0.02);
    }

    #[test]
    fn bivariate_offsets_cover_window() {
        let set = bivariate_gaussian_offsets(0.0, 0.0, 2.0, 2.0, 2);
        assert_eq!(set.len(), 25);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1_000 {
            let (x, y) = set.roulette_select(&mut rng);
            assert!((-2..=2).contains(&x));
            assert!((-2..=2).contains(&y));
        }
    }
}
