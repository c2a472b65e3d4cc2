//! Build script: embeds the git hash and checks GPU toolkits.
//!
//! The GPU checks run before whisper-rs-sys compiles, so a missing toolkit
//! fails fast with an install hint instead of a cmake error deep in the log.

use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "cuda") {
        require_tool("CUDA", "nvcc", &["--version"], "https://developer.nvidia.com/cuda-downloads");
    }
    if cfg!(feature = "vulkan") {
        require_tool("Vulkan", "vulkaninfo", &["--summary"], "https://vulkan.lunarg.com/");
    }
    if cfg!(feature = "hipblas") {
        require_tool("ROCm", "rocminfo", &[], "https://rocm.docs.amd.com/");
    }
    if cfg!(feature = "openblas") {
        let found = Command::new("pkg-config")
            .args(["--exists", "openblas"])
            .status()
            .is_ok_and(|s| s.success());
        if !found {
            fail("OpenBLAS", "sudo apt install libopenblas-dev");
        }
        println!("cargo::warning=OpenBLAS detected");
    }
}

fn require_tool(toolkit: &str, command: &str, args: &[&str], install_hint: &str) {
    match Command::new(command).args(args).output() {
        Ok(out) if out.status.success() => {
            println!("cargo::warning={} detected ({})", toolkit, command);
        }
        _ => fail(toolkit, install_hint),
    }
}

fn fail(toolkit: &str, install_hint: &str) -> ! {
    panic!(
        "\n\n{} toolkit not found.\n  Install: {}\n  Or build without it: cargo build --release --features whisper\n",
        toolkit, install_hint
    );
}
