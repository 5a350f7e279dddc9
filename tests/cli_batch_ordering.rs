//! CLI integration tests for batch processing
//!
//! Runs the built binary over a directory of generated images and checks the files it
//! writes and the order it handles inputs in.

#![cfg(feature = "cli")]

mod common;

use common::{blocks_on_white, png_bytes};
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_subject-cutout"))
        .args(args)
        .output()
        .expect("Failed to run subject-cutout")
}

fn write_inputs(dir: &TempDir, names: &[&str]) {
    for name in names {
        let image = blocks_on_white(20, 20, &[(5, 5, 8, 6)]);
        fs::write(dir.path().join(name), png_bytes(&image)).expect("Failed to write input");
    }
}

#[test]
fn test_cli_batch_alphanumerical_order() {
    let inputs = TempDir::new().expect("Failed to create temp directory");
    let outputs = TempDir::new().expect("Failed to create temp directory");
    write_inputs(&inputs, &["z_last.png", "a_first.png", "m_middle.png"]);
    fs::write(inputs.path().join("readme.txt"), "not an image").unwrap();

    let output = run_cli(&[
        inputs.path().to_str().unwrap(),
        "-o",
        outputs.path().to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    let position = |stem: &str| {
        stderr
            .find(&format!("Saved {}-subject0-", stem))
            .unwrap_or_else(|| panic!("no export logged for {}: {}", stem, stderr))
    };
    assert!(position("a_first") < position("m_middle"));
    assert!(position("m_middle") < position("z_last"));

    let written: Vec<String> = fs::read_dir(outputs.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(written.len(), 9);
    assert_eq!(written.iter().filter(|n| n.ends_with(".json")).count(), 3);
    assert_eq!(written.iter().filter(|n| n.contains("-thumb.")).count(), 3);
}

#[test]
fn test_cli_rotation_and_pattern() {
    let inputs = TempDir::new().unwrap();
    let outputs = TempDir::new().unwrap();
    write_inputs(&inputs, &["keep.png", "other.png"]);

    let output = run_cli(&[
        inputs.path().to_str().unwrap(),
        "--pattern",
        "keep*",
        "--rotate",
        "-90",
        "-o",
        outputs.path().to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let cutouts: Vec<_> = fs::read_dir(outputs.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "png")
                && !p.to_string_lossy().contains("-thumb")
        })
        .collect();
    assert_eq!(cutouts.len(), 1);
    let cutout = image::open(&cutouts[0]).unwrap();
    assert_eq!((cutout.width(), cutout.height()), (6, 8));
}

#[test]
fn test_cli_rejects_invalid_arguments() {
    let inputs = TempDir::new().unwrap();
    write_inputs(&inputs, &["a.png"]);
    let dir = inputs.path().to_str().unwrap();

    assert!(!run_cli(&[dir, "--rotate", "45"]).status.success());
    assert!(!run_cli(&[dir, "-t", "2.0"]).status.success());
    assert!(!run_cli(&["/no/such/input.png"]).status.success());
}
