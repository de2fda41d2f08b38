use graphfit::*;

const EPS : f64 = 1E-6;

fn linear_sum(y : f64) -> (Variable, Variable, LikelihoodModel) {
    let a = Variable::new("a", Prior::gaussian(0.0, 1.0));
    let b = Variable::new("b", Prior::gaussian(0.0, 1.0));
    let tree = ModelTree::branch()
        .with("a", &a).unwrap()
        .with("b", &b).unwrap();
    let model = LikelihoodModel::new("sum", tree, move |inst : &Instance| {
        Ok(-0.5 * (y - inst.scalar("a")? - inst.scalar("b")?).powi(2))
    }).unwrap();
    (a, b, model)
}

fn observation(name : &str, centre : &Variable, y : f64) -> LikelihoodModel {
    let tree = ModelTree::branch().with("centre", centre).unwrap();
    LikelihoodModel::new(name, tree, move |inst : &Instance| {
        Ok(-0.5 * (y - inst.scalar("centre")?).powi(2))
    }).unwrap()
}

#[test]
fn linear_model_reaches_mean_field_fixed_point() {
    let (a, b, model) = linear_sum(3.0);
    let mut approx = model.mean_field_approximation().unwrap();
    let conv = approx.run().unwrap();
    println!("{}", conv);
    assert!(conv.converged);
    assert!(conv.sweeps > 2);
    for v in [&a, &b].iter() {
        let q = approx.message(v).unwrap();
        assert!((q.mean()[0] - 1.0).abs() < EPS);
        assert!((q.variance()[0] - 0.5).abs() < EPS);
    }
}

#[test]
fn cauchy_observations_are_fit() {
    let centre = Variable::new("centre", Prior::gaussian(0.0, 1.0));
    let tree = ModelTree::branch().with("centre", &centre).unwrap();
    let obs = vec![5.0; 8];
    let model = LikelihoodModel::new("cauchy", tree, move |inst : &Instance| {
        let c = inst.scalar("centre")?;
        Ok(obs.iter().map(|y| -(1.0 + (y - c).powi(2)).ln() ).sum())
    }).unwrap();
    let mut approx = model.mean_field_approximation().unwrap();
    let conv = approx.run().unwrap();
    println!("{}", conv);
    assert!(conv.converged);
    let q = approx.message(&centre).unwrap();
    assert!((q.mean()[0] - 4.67722).abs() < 1E-3);
    assert!(q.variance()[0] > 0.0 && q.variance()[0] < 0.1);
}

#[test]
fn shared_centre_combines_observations() {
    let centre = Variable::new("centre", Prior::gaussian(0.0, 10.0));
    let coll = observation("first", &centre, 1.0) * observation("second", &centre, 3.0);
    assert_eq!(coll.priors().len(), 1);
    let mut approx = coll.mean_field_approximation().unwrap();
    assert!(approx.run().unwrap().converged);
    let q = approx.message(&centre).unwrap();
    assert!((q.mean()[0] - 4.0 / 2.01).abs() < EPS);
    assert!((q.variance()[0] - 1.0 / 2.01).abs() < EPS);
}

#[test]
fn posterior_as_prior_matches_joint_fit() {
    let centre = Variable::new("centre", Prior::gaussian(0.0, 1.0));
    let first = observation("first", &centre, 1.0);
    let mut approx = first.mean_field_approximation().unwrap();
    approx.run().unwrap();

    let tree = first.tree().gaussian_tree_for(approx.messages()).unwrap();
    let updated = match tree.get("centre") {
        Some(ModelTree::Parameter(v)) => v.clone(),
        _ => panic!("Expected a parameter")
    };
    assert!(updated != centre);
    let second = observation("second", &updated, 3.0);
    let mut approx = second.mean_field_approximation().unwrap();
    approx.run().unwrap();
    let sequential = approx.message(&updated).unwrap();

    let joint = first.clone() * observation("second", &centre, 3.0);
    let mut approx = joint.mean_field_approximation().unwrap();
    approx.run().unwrap();
    let joint = approx.message(&centre).unwrap();
    assert!((sequential.mean()[0] - 4.0 / 3.0).abs() < EPS);
    assert!((sequential.mean()[0] - joint.mean()[0]).abs() < EPS);
    assert!((sequential.variance()[0] - joint.variance()[0]).abs() < EPS);
}

#[test]
fn array_parameters_are_updated_per_element() {
    let weights = Variable::with_dim("weights", Prior::gaussian(0.0, 1.0), 3).unwrap();
    let tree = ModelTree::branch().with("weights", &weights).unwrap();
    let obs = [1.0, -1.0, 2.0];
    let model = LikelihoodModel::new("weights", tree, move |inst : &Instance| {
        let w = inst.vector("weights")?;
        Ok(w.iter().zip(obs.iter()).map(|(w, y)| -0.5 * (y - w).powi(2) ).sum())
    }).unwrap();
    let mut approx = model.mean_field_approximation().unwrap();
    assert!(approx.run().unwrap().converged);
    let marginal = approx.marginals().into_iter().find(|m| m.variable == weights ).unwrap();
    for (i, y) in obs.iter().enumerate() {
        assert!((marginal.mean[i] - y / 2.0).abs() < EPS);
        assert!((marginal.variance[i] - 0.5).abs() < EPS);
    }
}

#[test]
fn product_model_agrees_across_quadratures() {
    // log f = -(2 - ab)^2 / 2 is quadratic in each variable, so both rules are exact.
    let a = Variable::new("a", Prior::gaussian(1.0, 1.0));
    let b = Variable::new("b", Prior::gaussian(1.0, 1.0));
    let tree = ModelTree::branch().with("a", &a).unwrap().with("b", &b).unwrap();
    let model = LikelihoodModel::new("product", tree, |inst : &Instance| {
        Ok(-0.5 * (2.0 - inst.scalar("a")? * inst.scalar("b")?).powi(2))
    }).unwrap();
    let mut means = Vec::new();
    for q in [Quadrature::SigmaPoints, Quadrature::GaussHermite].iter() {
        let settings = MeanFieldSettings::new().quadrature(*q).max_sweeps(500).parallel(true);
        let mut approx = model.mean_field_approximation().unwrap().with_settings(settings);
        let conv = approx.run().unwrap();
        assert!(conv.converged);
        let qa = approx.message(&a).unwrap();
        assert!(qa.mean()[0] > 0.0 && qa.variance()[0] > 0.0);
        means.push(qa.mean()[0]);
    }
    assert!((means[0] - means[1]).abs() < 1E-4);
}

#[test]
fn tree_loaded_from_json_is_fit_and_reported() {
    let doc = r#"{
        "left" : {
            "centre" : { "type" : "Gaussian", "mean" : 0.0, "sigma" : 10.0, "share" : "centre" },
            "sigma" : 1.0
        },
        "right" : {
            "centre" : { "type" : "Gaussian", "mean" : 0.0, "sigma" : 10.0, "share" : "centre" },
            "sigma" : 1.0
        }
    }"#;
    let tree : ModelTree = doc.parse().unwrap();
    assert_eq!(tree.prior_count(), 1);
    let model = LikelihoodModel::new("profiles", tree, |inst : &Instance| {
        let mut lp = 0.0;
        for (side, y) in [("left", 1.0), ("right", 3.0)].iter() {
            let node = inst.get(side).ok_or_else(|| anyhow::anyhow!("missing {}", side) )?;
            let (c, s) = (node.scalar("centre")?, node.scalar("sigma")?);
            lp += -0.5 * ((y - c) / s).powi(2);
        }
        Ok(lp)
    }).unwrap();
    let mut approx = model.mean_field_approximation().unwrap();
    assert!(approx.run().unwrap().converged);
    let centre = model.priors()[0].clone();
    assert!((approx.message(&centre).unwrap().mean()[0] - 4.0 / 2.01).abs() < EPS);

    let config = FormatterConfig::default().with_format("centre", 3);
    let text = model.collection().summary(&approx, &config, 2.0).unwrap();
    println!("{}", text);
    assert!(text.starts_with("left"));
    assert!(text.contains(&format!("{:.3}", 4.0 / 2.01)[..]));
    assert!(!text.contains("right"));
}
