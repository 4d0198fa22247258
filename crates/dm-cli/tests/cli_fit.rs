use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_demstat"))
}

fn repo_root() -> PathBuf {
    // crates/dm-cli -> repo root
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    repo_root().join("tests/fixtures").join(name)
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("demstat_cli_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

// Short chains keep the test fast; convergence-quality gates are exercised
// in dm-inference's #[ignore]d slow tests instead.
const FAST: &[&str] = &["--chains", "2", "--warmup", "100", "--samples", "50", "--seed", "7"];

fn run_fit(extra: &[&str]) -> serde_json::Value {
    let input = fixture_path("oasis_small.csv");
    assert!(input.exists(), "missing fixture: {}", input.display());

    let mut args = vec!["fit", "--input"];
    let input_str = input.to_string_lossy().into_owned();
    args.push(&input_str);
    args.extend_from_slice(FAST);
    args.extend_from_slice(extra);

    let out = run(&args);
    assert!(
        out.status.success(),
        "fit should succeed, stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON")
}

fn assert_fit_contract(v: &serde_json::Value) {
    assert_eq!(v["n_subjects"].as_u64(), Some(36));
    assert_eq!(v["n_dropped"].as_u64(), Some(3));

    let params = v["parameters"].as_array().expect("parameters should be an array");
    assert_eq!(params.len(), 5, "intercept + 4 predictors");
    assert_eq!(params[0]["name"], "intercept");
    assert_eq!(params[1]["name"], "z_age");
    assert_eq!(params[2]["name"], "sex_male");
    assert_eq!(params[3]["name"], "z_mmse");
    assert_eq!(params[4]["name"], "z_nwbv");

    for p in params {
        let mean = p["mean"].as_f64().unwrap();
        let q025 = p["q025"].as_f64().unwrap();
        let q975 = p["q975"].as_f64().unwrap();
        assert!(mean.is_finite());
        assert!(q025 <= q975, "interval must be ordered for {}", p["name"]);
    }

    let odds = v["odds_ratios"].as_array().expect("odds_ratios should be an array");
    assert_eq!(odds.len(), 4, "one odds ratio per coefficient, intercept excluded");
    for o in odds {
        assert!(o["median"].as_f64().unwrap() > 0.0, "odds ratios are positive");
    }

    let mode = &v["mode_fit"];
    assert_eq!(mode["converged"].as_bool(), Some(true));
    assert!(mode["nll"].as_f64().unwrap().is_finite());

    assert!(v["sampler"]["divergence_rate"].as_f64().unwrap() >= 0.0);
    let status = v["quality"]["status"].as_str().unwrap();
    assert!(matches!(status, "ok" | "warn" | "fail"), "unexpected status {}", status);
}

#[test]
fn fit_writes_valid_json_to_stdout() {
    let v = run_fit(&[]);
    assert_fit_contract(&v);
}

#[test]
fn fit_writes_output_file() {
    let input = fixture_path("oasis_small.csv");
    let output = tmp_path("fit.json");

    let mut args = vec!["fit", "--input"];
    let input_str = input.to_string_lossy().into_owned();
    let output_str = output.to_string_lossy().into_owned();
    args.push(&input_str);
    args.extend_from_slice(&["--output", &output_str]);
    args.extend_from_slice(FAST);

    let out = run(&args);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let content = std::fs::read_to_string(&output).expect("output file should exist");
    let v: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_fit_contract(&v);

    let _ = std::fs::remove_file(&output);
}

#[test]
fn fit_is_deterministic_for_fixed_seed() {
    let v1 = run_fit(&[]);
    let v2 = run_fit(&[]);
    assert_eq!(
        v1["parameters"], v2["parameters"],
        "same seed and chain count should reproduce the summary exactly"
    );
}

#[test]
fn fit_flat_priors_mode_matches_mle_direction() {
    let v = run_fit(&["--flat-priors"]);
    assert_fit_contract(&v);

    // The fixture cohort was generated with dementia risk decreasing in MMSE
    // and nWBV; the MLE should point the same way.
    let mode = v["mode_fit"]["parameters"].as_array().unwrap();
    let b_mmse = mode[3].as_f64().unwrap();
    let b_nwbv = mode[4].as_f64().unwrap();
    assert!(b_mmse < 0.0, "MMSE coefficient should be negative, got {}", b_mmse);
    assert!(b_nwbv < 0.0, "nWBV coefficient should be negative, got {}", b_nwbv);
}

#[test]
fn fit_keeps_stdout_json_only_when_gates_warn() {
    // Short runs trip quality-gate warnings; those log lines must land on
    // stderr so stdout stays a single parseable JSON document.
    let input = fixture_path("oasis_small.csv");
    let input_str = input.to_string_lossy().into_owned();

    let mut args = vec!["fit", "--input", &input_str, "--log-level", "warn"];
    args.extend_from_slice(FAST);

    let out = run(&args);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(!stdout.contains("WARN"), "log lines leaked onto stdout: {}", stdout);

    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stdout should be exactly one JSON document");
    assert_fit_contract(&v);

    // The gate warnings themselves still surface, on stderr.
    let warnings = v["quality"]["warnings"].as_array().unwrap();
    if !warnings.is_empty() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(stderr.contains("quality gate"), "warnings should be logged: {}", stderr);
    }
}

#[test]
fn fit_rejects_zero_chains() {
    let input = fixture_path("oasis_small.csv");
    let input_str = input.to_string_lossy().into_owned();
    let out = run(&["fit", "--input", &input_str, "--chains", "0"]);
    assert!(!out.status.success(), "zero chains should be rejected");
}
