use approx::assert_abs_diff_eq;
use ipf_engine::{
    Constraint, Dataset, DegeneratePolicy, FitConfig, FitOptions, IpfError, SeedMode, adjust,
    build_features, estimate, fit, min_max_scale, validate,
};

fn survey() -> Dataset {
    Dataset::from_rows(
        &["sex", "age_band", "region"],
        [
            ["M", "18-34", "north"],
            ["M", "35-54", "north"],
            ["M", "55+", "south"],
            ["M", "18-34", "south"],
            ["F", "35-54", "north"],
            ["F", "55+", "north"],
            ["F", "18-34", "south"],
            ["F", "55+", "south"],
            ["F", "35-54", "south"],
            ["M", "55+", "north"],
        ],
    )
    .unwrap()
}

fn survey_constraints() -> Vec<Constraint> {
    vec![
        Constraint::new("sex").target("M", 480.0).target("F", 520.0),
        Constraint::new("age_band")
            .target("18-34", 300.0)
            .target("35-54", 350.0)
            .target("55+", 350.0),
        Constraint::new(["sex", "region"])
            .target(["M", "north"], 250.0)
            .target(["M", "south"], 230.0)
            .target(["F", "north"], 240.0)
            .target(["F", "south"], 280.0),
    ]
}

#[test]
fn three_row_male_one_row_female() {
    let data = Dataset::from_columns([("sex", vec!["M", "M", "M", "F"])]).unwrap();
    let constraints = [Constraint::new("sex").target("M", 30.0).target("F", 10.0)];
    let result = fit(&data, &constraints, &FitOptions::default()).unwrap();
    assert_eq!(result.weights(), &[10.0, 10.0, 10.0, 10.0]);
    assert_eq!(result.dataset.total_weight(), 40.0);
}

#[test]
fn consistent_margins_are_met() {
    let data = survey();
    let constraints = survey_constraints();
    let result = fit(&data, &constraints, &FitOptions::default()).unwrap();

    assert!(result.converged);
    assert!(result.non_convergence().is_none());
    assert_eq!(result.dataset.len(), data.len());

    let report = validate(&data, &result.dataset, &constraints).unwrap();
    assert!(report.total_abs_diff < 1e-4, "{report}");
    assert!(report.avg_pct_diff < 1e-4);
    for c in &report.constraints {
        for cat in &c.categories {
            assert_abs_diff_eq!(cat.after.unwrap(), cat.target.unwrap(), epsilon = 1e-4);
        }
    }
}

#[test]
fn inferred_seed_is_deterministic_and_finite() {
    let data = survey();
    let constraints = survey_constraints();

    // The seed offsets are the rows' scores on the first principal axis of
    // the scaled design matrix.
    let features = build_features(&data, &constraints).unwrap();
    let scores = estimate(&features).unwrap();
    let scaled = min_max_scale(features.values());
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(variance, 0.877_341_938_858_413, epsilon = 1e-9);
    for col in scaled.columns() {
        let m = col.sum() / n;
        let col_variance = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0);
        assert!(col_variance < variance);
    }
    // Sex carries the heaviest loading; male rows score positive.
    for (row, score) in scores.iter().enumerate() {
        let male = matches!(row, 0 | 1 | 2 | 3 | 9);
        assert_eq!(*score > 0.0, male, "row {row}: {score}");
    }
    // One female row starts below zero, so the loop cannot settle.
    assert!(1.0 + scores[8] < 0.0);

    let opts = FitOptions::default()
        .with_seed(SeedMode::Inferred)
        .with_max_iterations(50);
    let a = fit(&data, &constraints, &opts).unwrap();
    let b = fit(&data, &constraints, &opts).unwrap();

    assert_eq!(a.weights(), b.weights());
    assert!(!a.converged);
    assert_eq!(a.iterations, 50);
    assert!(a.non_convergence().is_some());
    assert_eq!(a.dataset.len(), data.len());
    assert!(a.weights().iter().all(|w| w.is_finite()));
}

#[test]
fn inferred_seed_converges_on_nested_margins() {
    let data = Dataset::from_rows(
        &["sex", "region"],
        [["M", "N"], ["M", "N"], ["M", "S"], ["F", "N"], ["F", "S"]],
    )
    .unwrap();
    let constraints = [
        Constraint::new("sex").target("M", 30.0).target("F", 20.0),
        Constraint::new(["sex", "region"])
            .target(["M", "N"], 20.0)
            .target(["M", "S"], 10.0)
            .target(["F", "N"], 12.0)
            .target(["F", "S"], 8.0),
    ];
    let opts = FitOptions::default().with_seed(SeedMode::Inferred);
    let result = fit(&data, &constraints, &opts).unwrap();
    assert!(result.converged);
    for (w, expected) in result.weights().iter().zip([10.0, 10.0, 10.0, 12.0, 8.0]) {
        assert_abs_diff_eq!(*w, expected, epsilon = 1e-9);
    }
}

#[test]
fn caller_dataset_is_not_modified() {
    let data = survey().with_weights(vec![2.0; 10]).unwrap();
    let before = data.clone();
    let _ = fit(&data, &survey_constraints(), &FitOptions::default()).unwrap();
    assert_eq!(data, before);
}

#[test]
fn inconsistent_totals_report_non_convergence() {
    let data = survey();
    let constraints = [
        Constraint::new("sex").target("M", 60.0).target("F", 40.0),
        Constraint::new("region").target("north", 30.0).target("south", 20.0),
    ];
    let opts = FitOptions::default().with_max_iterations(5);
    let result = fit(&data, &constraints, &opts).unwrap();

    assert!(!result.converged);
    assert_eq!(result.iterations, 5);
    assert_eq!(result.dataset.len(), 10);
    let notice = result.non_convergence().unwrap();
    assert!(notice.last_delta > opts.tolerance);
}

#[test]
fn degenerate_group_is_an_error_not_nan() {
    let data = survey().with_weights(vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
    let constraint = Constraint::new("sex").target("M", 50.0).target("F", 50.0);

    let err = adjust(&data, &constraint, DegeneratePolicy::Error).unwrap_err();
    assert!(matches!(err, IpfError::DegenerateGroup { .. }));

    let skipped = adjust(&data, &constraint, DegeneratePolicy::Skip).unwrap();
    assert!(skipped.weights().iter().all(|w| w.is_finite()));
    assert_abs_diff_eq!(skipped.total_weight(), 50.0, epsilon = 1e-9);
}

#[test]
fn config_driven_fit() {
    let config = FitConfig::from_toml_str(
        r#"
        [options]
        max_iterations = 200
        tolerance = 1e-9

        [[constraints]]
        dimension = "sex"
        targets = [
            { category = "M", total = 480.0 },
            { category = "F", total = 520.0 },
        ]

        [[constraints]]
        dimension = ["sex", "region"]
        targets = [
            { category = ["M", "north"], total = 250.0 },
            { category = ["M", "south"], total = 230.0 },
            { category = ["F", "north"], total = 240.0 },
            { category = ["F", "south"], total = 280.0 },
        ]
        "#,
    )
    .unwrap();

    let data = survey();
    let result = fit(&data, &config.constraints, &config.options).unwrap();
    assert!(result.converged);
    assert_abs_diff_eq!(result.dataset.total_weight(), 1000.0, epsilon = 1e-6);
}
