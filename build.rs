use std::env;
use std::path::PathBuf;

// Only the FFmpeg decode handle links native libraries; the scheduler core
// builds anywhere.
fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");

    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=framesweep: FFMPEG_DIR is not set. Build with --no-default-features to skip the FFmpeg decode handle, or point FFMPEG_DIR at an FFmpeg install."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let candidate = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if candidate.exists() {
        println!(
            "cargo:warning=framesweep: found vcpkg FFmpeg at {0}; set FFMPEG_DIR={0}",
            candidate.display()
        );
    } else {
        println!(
            "cargo:warning=framesweep: VCPKG_ROOT is set but {} has no FFmpeg install",
            candidate.display()
        );
    }
}
