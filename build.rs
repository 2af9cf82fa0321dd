//! Build script: bakes the commit SHA into `git-indexfs --version`.

use vergen_gitcl::{Emitter, GitclBuilder};

/// A non-empty `GIT_SHA` (release builds from a tarball have no `.git`) is used as is; otherwise
/// vergen-gitcl asks the local checkout.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-env-changed=GIT_SHA");

    match std::env::var("GIT_SHA") {
        Ok(sha) if !sha.trim().is_empty() => {
            println!("cargo:rustc-env=VERGEN_GIT_SHA={}", sha.trim());
        }
        _ => {
            let gitcl = GitclBuilder::default().sha(true).build()?;
            Emitter::default().add_instructions(&gitcl)?.emit()?;
        }
    }

    Ok(())
}
