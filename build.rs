//! Build script for detecting system dependencies and providing installation guidance.
//!
//! The `opencv` crate links against the system OpenCV (found through
//! pkg-config) and generates its bindings with libclang. Missing pieces are
//! reported as cargo warnings with installation hints.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_PATHS");
    println!("cargo:rerun-if-env-changed=OPENCV_INCLUDE_PATHS");
    println!("cargo:rerun-if-env-changed=LIBCLANG_PATH");

    if pkg_config_version(None).is_none() {
        println!("cargo:warning=pkg-config not found. It is needed to locate OpenCV.");
        print_hints("pkg-config", "pkg-config");
    }

    // Modules used: core, imgproc (morphology, contours, hull) and calib3d
    match pkg_config_version(Some("opencv4")).or_else(|| pkg_config_version(Some("opencv"))) {
        Some(version) => println!("cargo:warning=Found OpenCV version: {version}"),
        None => {
            println!("cargo:warning=OpenCV not found via pkg-config. Segmentation and contour tracing need it.");
            print_hints("libopencv-dev", "opencv");
        }
    }

    if env::var("LIBCLANG_PATH").is_err() && Command::new("llvm-config").arg("--version").output().is_err() {
        println!("cargo:warning=libclang not located; the opencv bindings generator may fail.");
        print_hints("libclang-dev", "llvm");
    }
}

/// Version reported by pkg-config for `package`, or of pkg-config itself
fn pkg_config_version(package: Option<&str>) -> Option<String> {
    let mut command = Command::new("pkg-config");
    match package {
        Some(package) => command.args(["--modversion", package]),
        None => command.arg("--version"),
    };
    let output = command.output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn print_hints(apt_package: &str, brew_package: &str) {
    println!("cargo:warning=On Ubuntu: sudo apt-get install {apt_package}");
    println!("cargo:warning=On macOS: brew install {brew_package}");
}
