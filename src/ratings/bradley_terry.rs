//! Bradley-Terry strengths from a win matrix.
//!
//! The probability that `i` beats `j` is `σ(s_i - s_j)`. Strengths are
//! fitted by penalised maximum likelihood:
//!
//! ```text
//! LL(s) = Σ_pairs [ w_ij·log σ(s_i − s_j) + w_ji·log σ(s_j − s_i) ] − λ·Σ s_i²
//! ```
//!
//! subject to `Σ s_i = 0`, and converted to Elo with
//! `R = 1200 + (400 / ln 10)·s`.
use std::{
    collections::BTreeMap,
    f64::consts::LN_10,
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{event, Level};

use super::{AllNormalization, Matchups, RatingsError, WinMatrix, ALL_GAMES};

pub const ELO_BASE: f64 = 1200.0;
pub const ELO_SLOPE: f64 = 400.0;

/// Elo rating of a Bradley-Terry strength.
pub fn bt_to_elo(strength: f64) -> f64 {
    ELO_BASE + (ELO_SLOPE / LN_10) * strength
}

/// Bradley-Terry strength of an Elo rating.
pub fn elo_to_bt(rating: f64) -> f64 {
    (rating - ELO_BASE) * LN_10 / ELO_SLOPE
}

/// `ln σ(x)`, without overflow for large `|x|`.
fn log_sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// One pair of a game, by participant index.
#[derive(Debug, Clone, Copy)]
struct Comparison {
    i: usize,
    j: usize,
    w_ij: f64,
    w_ji: f64,
}

/// The fitted strengths of one game.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Participants in sorted order.
    pub participants: Vec<String>,
    pub strengths: Vec<f64>,
    /// The penalised log-likelihood at `strengths`.
    pub log_likelihood: f64,
    pub converged: bool,
    pub iterations: usize,
    pub message: String,
}

impl FitResult {
    pub fn strength_of(&self, participant: &str) -> Option<f64> {
        let idx = self.participants.iter().position(|p| p == participant)?;
        self.strengths.get(idx).copied()
    }

    pub fn elo_of(&self, participant: &str) -> Option<f64> {
        self.strength_of(participant).map(bt_to_elo)
    }

    /// `(participant, strength)`, strongest first.
    pub fn ranking(&self) -> Vec<(&str, f64)> {
        let mut ranking: Vec<(&str, f64)> = self
            .participants
            .iter()
            .map(String::as_str)
            .zip(self.strengths.iter().copied())
            .collect();
        ranking.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranking
    }
}

/// Fits Bradley-Terry strengths with Newton's method on the sum zero
/// plane, with a backtracking line search.
///
/// ```
/// use codeclash::ratings::{bt_to_elo, BradleyTerryFitter, WinMatrix};
///
/// let mut matrix = WinMatrix::new();
/// matrix.add("CoreWar", "a", "b", 10.0, 0.0);
/// let fit = BradleyTerryFitter::default().fit_game("CoreWar", matrix.game("CoreWar").unwrap());
/// assert!(fit.strength_of("a").unwrap() > fit.strength_of("b").unwrap());
/// assert!(fit.elo_of("a").unwrap() > bt_to_elo(0.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BradleyTerryFitter {
    regularization: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for BradleyTerryFitter {
    fn default() -> Self {
        BradleyTerryFitter {
            regularization: 0.01,
            max_iterations: 1000,
            tolerance: 1e-9,
        }
    }
}

impl BradleyTerryFitter {
    /// The penalty `λ`. Negative values are treated as zero.
    pub fn regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization.max(0.0);
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn get_regularization(&self) -> f64 {
        self.regularization
    }

    /// Fit every game of the matrix.
    pub fn fit_all(&self, matrix: &WinMatrix) -> BTreeMap<String, FitResult> {
        let games: Vec<(&str, &Matchups)> = matrix.games().collect();
        games
            .par_iter()
            .map(|(game, matchups)| {
                event!(Level::INFO, game = %game, "Fitting Bradley-Terry model");
                (game.to_string(), self.fit_game(game, matchups))
            })
            .collect()
    }

    /// Fit one game.
    ///
    /// A fit that does not converge still returns its best iterate, with
    /// `converged` unset and a warning logged.
    pub fn fit_game(&self, game: &str, matchups: &Matchups) -> FitResult {
        let (participants, comparisons) = Self::index(matchups);
        let n = participants.len();
        let total_weight: f64 = comparisons.iter().map(|c| c.w_ij + c.w_ji).sum();
        let tolerance = self.tolerance * (1.0 + total_weight);

        let mut s = DVector::<f64>::zeros(n);
        let mut f = self.objective(s.as_slice(), &comparisons);
        let mut converged = n <= 1;
        let mut message = if converged {
            "Nothing to fit".to_string()
        } else {
            format!("Reached {} iterations", self.max_iterations)
        };
        let mut iterations = 0;

        while !converged && iterations < self.max_iterations {
            iterations += 1;
            let (gradient, hessian) = self.derivatives(&s, &comparisons);
            let projected = &gradient - DVector::from_element(n, gradient.mean());
            if projected.amax() <= tolerance {
                converged = true;
                message = "Converged".to_string();
                break;
            }

            let step = Self::newton_step(&gradient, &hessian)
                .unwrap_or_else(|| -projected.clone());
            let slope = gradient.dot(&step);
            let step = if slope < 0.0 { step } else { -projected };
            let slope = gradient.dot(&step);

            // Backtrack until the objective decreases enough.
            let mut t = 1.0;
            let mut next = &s + &step * t;
            let mut f_next = self.objective(next.as_slice(), &comparisons);
            while f_next > f + 1e-4 * t * slope && t > 1e-12 {
                t *= 0.5;
                next = &s + &step * t;
                f_next = self.objective(next.as_slice(), &comparisons);
            }
            if f_next > f {
                message = "Line search failed to decrease the objective".to_string();
                break;
            }

            let mean = next.mean();
            next.add_scalar_mut(-mean);
            s = next;
            f = self.objective(s.as_slice(), &comparisons);
        }

        if !converged {
            event!(
                Level::WARN,
                game = %game,
                iterations,
                "Optimization failed: {message}"
            );
        }

        FitResult {
            participants,
            strengths: s.iter().copied().collect(),
            log_likelihood: -f,
            converged,
            iterations,
            message,
        }
    }

    /// Participants in sorted order and the pairs between them. Pairs of a
    /// participant with itself carry no information and are dropped.
    fn index(matchups: &Matchups) -> (Vec<String>, Vec<Comparison>) {
        let mut participants: Vec<String> = matchups
            .keys()
            .flat_map(|(a, b)| [a.clone(), b.clone()])
            .collect();
        participants.sort();
        participants.dedup();
        let idx = |name: &String| participants.binary_search(name).unwrap_or_default();

        let comparisons = matchups
            .iter()
            .filter(|((a, b), _)| a != b)
            .map(|((a, b), [w1, w2])| Comparison {
                i: idx(a),
                j: idx(b),
                w_ij: *w1,
                w_ji: *w2,
            })
            .collect();
        (participants, comparisons)
    }

    /// The penalised negative log-likelihood.
    fn objective(&self, strengths: &[f64], comparisons: &[Comparison]) -> f64 {
        let ll: f64 = comparisons
            .iter()
            .map(|c| {
                let diff = strengths[c.i] - strengths[c.j];
                c.w_ij * log_sigmoid(diff) + c.w_ji * log_sigmoid(-diff)
            })
            .sum();
        let penalty: f64 = strengths.iter().map(|s| s * s).sum::<f64>() * self.regularization;
        -ll + penalty
    }

    fn derivatives(
        &self,
        s: &DVector<f64>,
        comparisons: &[Comparison],
    ) -> (DVector<f64>, DMatrix<f64>) {
        let n = s.len();
        let mut gradient = s * (2.0 * self.regularization);
        let mut hessian = DMatrix::from_diagonal_element(n, n, 2.0 * self.regularization);
        for c in comparisons {
            let p = sigmoid(s[c.i] - s[c.j]);
            let total = c.w_ij + c.w_ji;
            let g = total * p - c.w_ij;
            gradient[c.i] += g;
            gradient[c.j] -= g;
            let h = total * p * (1.0 - p);
            hessian[(c.i, c.i)] += h;
            hessian[(c.j, c.j)] += h;
            hessian[(c.i, c.j)] -= h;
            hessian[(c.j, c.i)] -= h;
        }
        (gradient, hessian)
    }

    /// Solve the Newton system restricted to `Σ step = 0`:
    ///
    /// ```text
    /// [ H  1 ] [ step ]   [ -g ]
    /// [ 1ᵀ 0 ] [  μ   ] = [  0 ]
    /// ```
    fn newton_step(gradient: &DVector<f64>, hessian: &DMatrix<f64>) -> Option<DVector<f64>> {
        let n = gradient.len();
        let solve = |ridge: f64| {
            let mut kkt = DMatrix::<f64>::zeros(n + 1, n + 1);
            kkt.view_mut((0, 0), (n, n)).copy_from(hessian);
            for i in 0..n {
                kkt[(i, i)] += ridge;
                kkt[(i, n)] = 1.0;
                kkt[(n, i)] = 1.0;
            }
            let mut rhs = DVector::<f64>::zeros(n + 1);
            rhs.rows_mut(0, n).copy_from(&(-gradient));
            kkt.lu().solve(&rhs)
        };
        let solution = solve(0.0).or_else(|| solve(1e-6))?;
        let step = solution.rows(0, n).into_owned();
        step.iter().all(|x| x.is_finite()).then_some(step)
    }

    /// Negative log-likelihood of every participant's strength over ±2
    /// around the fit, the others held fixed and the sum re-centred. One
    /// row per point: `participant,strength,nll`.
    pub fn likelihood_profile(&self, fit: &FitResult, matchups: &Matchups) -> Vec<(String, f64, f64)> {
        const POINTS: usize = 100;
        let (_, comparisons) = Self::index(matchups);
        let mut rows = Vec::with_capacity(fit.participants.len() * POINTS);
        for (idx, participant) in fit.participants.iter().enumerate() {
            let optimum = fit.strengths[idx];
            for k in 0..POINTS {
                let strength = optimum - 2.0 + 4.0 * k as f64 / (POINTS - 1) as f64;
                let mut trial = fit.strengths.clone();
                trial[idx] = strength;
                let mean = trial.iter().sum::<f64>() / trial.len() as f64;
                trial.iter_mut().for_each(|s| *s -= mean);
                rows.push((
                    participant.clone(),
                    strength,
                    self.objective(&trial, &comparisons),
                ));
            }
        }
        rows
    }
}

/// The fitted ratings, one table per game.
pub fn format_results(
    results: &BTreeMap<String, FitResult>,
    regularization: f64,
    normalization: AllNormalization,
) -> String {
    let mut out = format!(
        "Regularization λ = {regularization}\nALL game normalization: {normalization}\nElo conversion: R = {ELO_BASE} + ({ELO_SLOPE}/ln(10)) * s\n"
    );
    for (game, fit) in results {
        out.push_str(&format!("\n{game}:\n"));
        out.push_str(&format!("Log-likelihood: {:.2}\n", fit.log_likelihood));
        out.push_str(&format!("\n{:<30} {:>12} {:>8}\n", "Player", "BT Strength", "Elo"));
        out.push_str(&"-".repeat(52));
        out.push('\n');
        for (player, strength) in fit.ranking() {
            out.push_str(&format!(
                "  {player:<30} {strength:12.3} {:8.0}\n",
                bt_to_elo(strength)
            ));
        }
    }
    out
}

pub fn print_results(
    results: &BTreeMap<String, FitResult>,
    regularization: f64,
    normalization: AllNormalization,
) {
    print!("{}", format_results(results, regularization, normalization));
}

fn safe_file_name(game: &str) -> String {
    game.replace(['/', ' '], "_")
}

/// Write `<game>_validation.csv` with the likelihood profile of every
/// game into `dir`.
pub fn write_validation_profiles(
    fitter: &BradleyTerryFitter,
    results: &BTreeMap<String, FitResult>,
    matrix: &WinMatrix,
    dir: &Path,
) -> Result<Vec<PathBuf>, RatingsError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for (game, fit) in results {
        let Some(matchups) = matrix.game(game) else {
            continue;
        };
        let path = dir.join(format!("{}_validation.csv", safe_file_name(game)));
        let mut out = BufWriter::new(fs::File::create(&path)?);
        writeln!(out, "participant,optimal_strength,strength,nll")?;
        for (participant, strength, nll) in fitter.likelihood_profile(fit, matchups) {
            let optimum = fit.strength_of(&participant).unwrap_or_default();
            writeln!(out, "{participant},{optimum},{strength},{nll}")?;
        }
        out.flush()?;
        event!(Level::INFO, path = %path.display(), "Saved likelihood profile");
        written.push(path);
    }
    Ok(written)
}

/// Write `all_games_elo.csv`: one row per participant, ordered by the
/// [`ALL_GAMES`] pool, one Elo column per game. Games a participant never
/// played are left empty.
pub fn write_elo_table(
    results: &BTreeMap<String, FitResult>,
    dir: &Path,
) -> Result<Option<PathBuf>, RatingsError> {
    let Some(all) = results.get(ALL_GAMES) else {
        event!(Level::WARN, "No ALL pool in results, skipping Elo table");
        return Ok(None);
    };
    fs::create_dir_all(dir)?;
    let path = dir.join("all_games_elo.csv");
    let mut out = BufWriter::new(fs::File::create(&path)?);
    let games: Vec<&String> = results.keys().collect();
    write!(out, "participant")?;
    for game in &games {
        write!(out, ",{game}")?;
    }
    writeln!(out)?;
    for (participant, _) in all.ranking() {
        write!(out, "{participant}")?;
        for game in &games {
            match results[*game].elo_of(participant) {
                Some(elo) => write!(out, ",{elo:.1}")?,
                None => write!(out, ",")?,
            }
        }
        writeln!(out)?;
    }
    out.flush()?;
    event!(Level::INFO, path = %path.display(), "Saved Elo table");
    Ok(Some(path))
}
