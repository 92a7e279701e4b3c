// Compiles the GLSL shader sources to SPIR-V with glslc (Vulkan SDK).
// The engine loads the compiled binaries at runtime from shaders/.

use std::path::Path;
use std::process::Command;

const SHADER_SOURCES: [&str; 2] = ["shaders/forward.vert", "shaders/forward.frag"];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    for source in SHADER_SOURCES {
        compile_shader(source);
    }
}

fn compile_shader(source: &str) {
    let output = format!("{}.spv", source);

    let status = Command::new("glslc")
        .arg(Path::new(source))
        .arg("-o")
        .arg(Path::new(&output))
        .status();

    match status {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", source, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", source, status.code());
        }
        Err(e) => {
            eprintln!("Warning: glslc not found ({})", e);
            eprintln!("Compile the shaders manually before running:");
            eprintln!("  glslc {} -o {}", source, output);
        }
    }
}
