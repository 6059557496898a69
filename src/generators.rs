//! Functions to generate synthetic test sequences
use rand::Rng;
use rv::dist::Gaussian;
use rv::traits::Rv;

/// Generate `size` iid draws from a Gaussian with the given mean and
/// standard deviation.
///
/// # Example
/// ```rust
/// use tsbreak::generators::gaussian_noise;
/// use rand::rngs::SmallRng;
/// use rand::SeedableRng;
/// let mut rng: SmallRng = SmallRng::seed_from_u64(0x12345);
/// let seq: Vec<f64> = gaussian_noise(&mut rng, 0.0, 1.0, 250);
/// assert_eq!(seq.len(), 250);
/// ```
pub fn gaussian_noise<R: Rng>(rng: &mut R, mu: f64, sigma: f64, size: usize) -> Vec<f64> {
    let g = Gaussian::new(mu, sigma).expect("Arguments should be valid");
    g.sample(size, rng)
}

/// Generate a series of draws from two Gaussian processes that switches
/// at `switch` into the sequence.
///
/// # Example
/// ```rust
/// use tsbreak::generators::discontinuous_jump;
/// use rand::rngs::SmallRng;
/// use rand::SeedableRng;
/// let mut rng: SmallRng = SmallRng::seed_from_u64(0x12345);
/// // Generate 1000 numbers from G(0, 1) then G(10, 5), switching at 500.
/// let seq: Vec<f64> = discontinuous_jump(
///     &mut rng,
///     0.0,
///     1.0,
///     10.0,
///     5.0,
///     500,
///     1000
/// );
/// assert_eq!(seq.len(), 1000);
/// ```
pub fn discontinuous_jump<R: Rng>(
    rng: &mut R,
    mu_1: f64,
    sigma_1: f64,
    mu_2: f64,
    sigma_2: f64,
    switch: usize,
    size: usize,
) -> Vec<f64> {
    let g1 = Gaussian::new(mu_1, sigma_1).expect("Arguments should be valid");
    let g2 = Gaussian::new(mu_2, sigma_2).expect("Arguments should be valid");
    [g1.sample(switch, rng), g2.sample(size - switch, rng)].concat()
}

/// Generate a random walk: the cumulative sum of Gaussian increments.
pub fn random_walk<R: Rng>(rng: &mut R, sigma: f64, size: usize) -> Vec<f64> {
    let steps = gaussian_noise(rng, 0.0, sigma, size);
    steps
        .into_iter()
        .scan(0.0, |acc, s| {
            *acc += s;
            Some(*acc)
        })
        .collect()
}
