use std::path::Path;
use std::process::Command;

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

fn write_square(path: &Path) {
    let mut image = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255]));
    for y in 8..24 {
        for x in 8..24 {
            image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }
    }
    image.save(path).unwrap();
}

fn edgecam() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_edgecam"));
    command.env_remove("EDGECAM_CONFIG").env("RUST_LOG", "warn");
    command
}

#[test]
fn version_reports_both_libraries() {
    let output = edgecam().arg("version").output().expect("run edgecam version");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(&format!("edgecam {}", env!("CARGO_PKG_VERSION"))));
    assert!(stdout.contains("edgeproc"));
}

#[test]
fn process_writes_edges() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("square.png");
    let output = dir.path().join("edges.png");
    write_square(&input);

    let status = edgecam()
        .args(["process", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .status()
        .expect("run edgecam process");
    assert!(status.success());

    let edges = image::open(&output).unwrap().to_rgba8();
    assert_eq!(edges.dimensions(), (32, 32));
    assert_eq!(edges.get_pixel(16, 16).0, [0, 0, 0, 255]);
    assert!(edges.pixels().any(|pixel| pixel.0 == [255, 255, 255, 255]));
}

#[test]
fn passthrough_keeps_the_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("square.png");
    let output = dir.path().join("copy.png");
    write_square(&input);

    let status = edgecam()
        .args(["process", "--passthrough", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("run edgecam process --passthrough");
    assert!(status.success());

    let original = image::open(&input).unwrap().to_rgba8();
    let copy = image::open(&output).unwrap().to_rgba8();
    assert_eq!(original, copy);
}

#[test]
fn inverted_thresholds_fail() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("square.png");
    write_square(&input);

    let status = edgecam()
        .args(["process", "--low", "200", "--high", "100", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out.png"))
        .status()
        .expect("run edgecam process");
    assert!(!status.success());
    assert!(!dir.path().join("out.png").exists());
}

#[test]
fn config_uses_the_config_dir_override() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("edgecam.toml"),
        "version = 1\n\n[processing]\nfilter = \"grayscale\"\n",
    )
    .unwrap();

    let output = edgecam()
        .env("EDGECAM_CONFIG_DIR", dir.path())
        .arg("config")
        .output()
        .expect("run edgecam config");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("edgecam.toml"));
    assert!(stdout.contains("filter = \"grayscale\""));

    let rejected = edgecam()
        .env("EDGECAM_CONFIG_DIR", dir.path())
        .args(["--low", "300", "config"])
        .output()
        .expect("run edgecam config with overrides");
    assert!(!rejected.status.success());
}
