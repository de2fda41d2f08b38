use nalgebra::*;
use std::collections::HashMap;
use tracing::trace;
use crate::graph::{Variable, Factor, Assignment};
use crate::message::{Message, NormalMessage};
use crate::error::GraphError;
use super::settings::{MeanFieldSettings, Quadrature};

/// Largest number of factor evaluations a quadrature rule may spend per stencil point.
pub const MAX_QUADRATURE_POINTS : usize = 100_000;

const HERMITE_WEIGHTS : [f64; 3] = [1. / 6., 2. / 3., 1. / 6.];

/// Quadrature rule over m standard normal dimensions, as a list of weights and
/// nodes (in standard deviations from the mean). Weights sum to one.
pub(crate) fn quadrature_nodes(
    quadrature : Quadrature,
    m : usize,
    factor : &Factor
) -> Result<Vec<(f64, Vec<f64>)>, GraphError> {
    if m == 0 {
        return Ok(vec![(1.0, Vec::new())]);
    }
    match quadrature {
        Quadrature::PointEstimate => Ok(vec![(1.0, vec![0.0; m])]),
        Quadrature::SigmaPoints => {
            let spread = (m as f64).sqrt();
            let w = 1. / (2. * m as f64);
            let mut nodes = Vec::with_capacity(2*m);
            for i in 0..m {
                for s in [-1.0, 1.0].iter() {
                    let mut z = vec![0.0; m];
                    z[i] = s * spread;
                    nodes.push((w, z));
                }
            }
            Ok(nodes)
        },
        Quadrature::GaussHermite => {
            let n = match 3usize.checked_pow(m as u32) {
                Some(n) if n <= MAX_QUADRATURE_POINTS => n,
                _ => return Err(GraphError::Quadrature {
                    factor : factor.name().to_string(),
                    points : 3usize.checked_pow(m as u32).unwrap_or(usize::MAX)
                })
            };
            let abscissa = [-(3.0f64).sqrt(), 0.0, (3.0f64).sqrt()];
            let mut nodes = Vec::with_capacity(n);
            for mut k in 0..n {
                let mut w = 1.0;
                let mut z = Vec::with_capacity(m);
                for _ in 0..m {
                    w *= HERMITE_WEIGHTS[k % 3];
                    z.push(abscissa[k % 3]);
                    k /= 3;
                }
                nodes.push((w, z));
            }
            Ok(nodes)
        }
    }
}

/// Gaussian projection of the expected log-contribution of a factor. For each scalar element
/// x of each factor variable, F(x) = E[log f] is taken over the current messages of all other
/// elements, and its curvature and slope at the current mean m (by central differences with
/// step h = step * sigma) give the precision max(-F''(m), 0) and shift
/// max(-F''(m), 0) m + F'(m) of the contribution to the message of that element. Where F is
/// locally convex (e.g. in the tails of a heavy-tailed likelihood) the contribution keeps
/// its slope but adds no precision. Log-contributions concave and quadratic in x are
/// projected exactly. Factors with a closed-form contribution (priors) return it directly.
pub(crate) fn project(
    factor : &Factor,
    messages : &HashMap<Variable, NormalMessage>,
    settings : &MeanFieldSettings
) -> Result<Vec<(Variable, NormalMessage)>, GraphError> {
    let vars = factor.variables();
    if let Some(msg) = factor.closed_form() {
        return Ok(vars.iter().map(|v| (v.clone(), msg.clone()) ).collect());
    }
    let mut means = Vec::with_capacity(vars.len());
    let mut sigmas = Vec::with_capacity(vars.len());
    for v in vars.iter() {
        let msg = messages.get(v).ok_or_else(|| GraphError::MissingMessage { variable : v.label() })?;
        means.push(msg.mean());
        sigmas.push(msg.sigma());
    }

    // Each scalar element of each variable is a mean-field site.
    let sites : Vec<(usize, usize)> = vars.iter()
        .enumerate()
        .flat_map(|(i, v)| (0..v.dim()).map(move |j| (i, j) ) )
        .collect();
    let nodes = quadrature_nodes(settings.quadrature, sites.len().saturating_sub(1), factor)?;

    let mut asg : Assignment = vars.iter().cloned().zip(means.iter().cloned()).collect();
    let mut precision : Vec<DVector<f64>> = vars.iter().map(|v| DVector::zeros(v.dim()) ).collect();
    let mut shift : Vec<DVector<f64>> = vars.iter().map(|v| DVector::zeros(v.dim()) ).collect();
    for (s, &(vi, ei)) in sites.iter().enumerate() {
        let mu = means[vi][ei];
        let h = settings.step * sigmas[vi][ei];
        let mut f = [0.0; 3];
        for (w, z) in nodes.iter() {
            let others = sites.iter().enumerate().filter(|(k, _)| *k != s ).map(|(_, site)| site );
            for (&(vj, ej), zk) in others.zip(z.iter()) {
                set(&mut asg, &vars[vj], ej, means[vj][ej] + zk * sigmas[vj][ej]);
            }
            for (fk, d) in f.iter_mut().zip([-1.0, 0.0, 1.0].iter()) {
                set(&mut asg, &vars[vi], ei, mu + d * h);
                *fk += w * factor.evaluate(&asg)?;
            }
        }
        if !f.iter().all(|fk| fk.is_finite() ) {
            return Err(GraphError::NonFinite { factor : factor.name().to_string() });
        }

        // Leave every element back at its mean before moving to the next site.
        for (&(vj, ej), mean) in sites.iter().map(|site| (site, means[site.0][site.1]) ) {
            set(&mut asg, &vars[vj], ej, mean);
        }

        let grad = (f[2] - f[0]) / (2. * h);
        let curv = (f[2] - 2. * f[1] + f[0]) / h.powi(2);
        let lambda = (-curv).max(0.0);
        precision[vi][ei] = lambda;
        shift[vi][ei] = lambda * mu + grad;
        trace!(factor = factor.name(), variable = %vars[vi].label(), element = ei, grad, curv, "projected site");
    }
    vars.iter()
        .cloned()
        .zip(precision.into_iter().zip(shift.into_iter()))
        .map(|(v, (p, s))| NormalMessage::from_natural(p, s).map(|msg| (v, msg) ) )
        .collect()
}

fn set(asg : &mut Assignment, v : &Variable, elem : usize, val : f64) {
    if let Some(x) = asg.get_mut(v) {
        x[elem] = val;
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::prior::Prior;
    use approx::assert_relative_eq;

    fn moments(nodes : &[(f64, Vec<f64>)], i : usize, j : usize) -> (f64, f64, f64) {
        let w : f64 = nodes.iter().map(|(w, _)| *w ).sum();
        let first : f64 = nodes.iter().map(|(w, z)| w * z[i] ).sum();
        let second : f64 = nodes.iter().map(|(w, z)| w * z[i] * z[j] ).sum();
        (w, first, second)
    }

    #[test]
    fn rules_match_standard_normal_moments() {
        let x = Variable::new("x", Prior::gaussian(0.0, 1.0));
        let f = Factor::new("f", vec![x], |_ : &Assignment| Ok(0.0) ).unwrap();
        for q in [Quadrature::SigmaPoints, Quadrature::GaussHermite].iter() {
            let nodes = quadrature_nodes(*q, 3, &f).unwrap();
            let (w, first, var) = moments(&nodes, 1, 1);
            assert_relative_eq!(w, 1.0, epsilon = 1E-12);
            assert_relative_eq!(first, 0.0, epsilon = 1E-12);
            assert_relative_eq!(var, 1.0, epsilon = 1E-12);
            let (_, _, cov) = moments(&nodes, 0, 2);
            assert_relative_eq!(cov, 0.0, epsilon = 1E-12);
        }
        assert_eq!(quadrature_nodes(Quadrature::GaussHermite, 2, &f).unwrap().len(), 9);
        assert!(matches!(
            quadrature_nodes(Quadrature::GaussHermite, 40, &f),
            Err(GraphError::Quadrature { .. })
        ));
    }

    #[test]
    fn quadratic_factor_is_projected_exactly() {
        // log f = -(3 - a - b)^2 / 2 with q(b) = N(0.5, 0.25): the a-contribution is
        // precision 1, shift 3 - 0.5 = 2.5 whatever the rule over b.
        let a = Variable::new("a", Prior::gaussian(0.0, 1.0));
        let b = Variable::new("b", Prior::gaussian(0.0, 1.0));
        let (ac, bc) = (a.clone(), b.clone());
        let f = Factor::new("sum", vec![a.clone(), b.clone()], move |asg : &Assignment| {
            Ok(-0.5 * (3.0 - asg[&ac][0] - asg[&bc][0]).powi(2))
        }).unwrap();
        let mut messages = HashMap::new();
        messages.insert(a.clone(), NormalMessage::scalar(1.0, 2.0));
        messages.insert(b.clone(), NormalMessage::scalar(0.5, 0.25));
        for q in [Quadrature::PointEstimate, Quadrature::SigmaPoints, Quadrature::GaussHermite].iter() {
            let settings = MeanFieldSettings::new().quadrature(*q);
            let contribs = project(&f, &messages, &settings).unwrap();
            let (va, ma) = &contribs[0];
            assert_eq!(va, &a);
            assert_relative_eq!(ma.precision()[0], 1.0, epsilon = 1E-5);
            assert_relative_eq!(ma.shift()[0], 2.5, epsilon = 1E-5);
        }
    }

    #[test]
    fn convex_tail_adds_no_precision() {
        // log f = -ln(1 + (5 - x)^2) is convex at x = 0, with slope 10 / 26.
        let x = Variable::new("x", Prior::gaussian(0.0, 1.0));
        let xc = x.clone();
        let f = Factor::new("cauchy", vec![x.clone()], move |asg : &Assignment| {
            Ok(-(1.0 + (5.0 - asg[&xc][0]).powi(2)).ln())
        }).unwrap();
        let mut messages = HashMap::new();
        messages.insert(x.clone(), NormalMessage::scalar(0.0, 1.0));
        let contribs = project(&f, &messages, &MeanFieldSettings::default()).unwrap();
        let (_, m) = &contribs[0];
        assert_eq!(m.precision()[0], 0.0);
        assert_relative_eq!(m.shift()[0], 10.0 / 26.0, epsilon = 1E-5);

        // Near the observation the factor is concave and contributes its curvature.
        messages.insert(x.clone(), NormalMessage::scalar(5.0, 1.0));
        let contribs = project(&f, &messages, &MeanFieldSettings::default()).unwrap();
        assert_relative_eq!(contribs[0].1.precision()[0], 2.0, epsilon = 1E-3);
    }

    #[test]
    fn missing_message_is_reported() {
        let a = Variable::new("a", Prior::gaussian(0.0, 1.0));
        let f = Factor::new("f", vec![a.clone()], |_ : &Assignment| Ok(0.0) ).unwrap();
        let res = project(&f, &HashMap::new(), &MeanFieldSettings::default());
        assert!(matches!(res, Err(GraphError::MissingMessage { .. })));
    }

}
