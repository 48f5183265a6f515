// Build script: regenerate the C header with `cbindgen` when it is installed,
// otherwise publish the checked-in `include/qaudio.h` to $OUT_DIR.

use std::{env, fs, path::PathBuf, process::Command};

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/qaudio.h");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR unset"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR unset"));
    let checked_in = crate_dir.join("include").join("qaudio.h");
    let generated = out_dir.join("qaudio.h");

    let have_cbindgen = Command::new("cbindgen")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success());

    if have_cbindgen {
        let ok = Command::new("cbindgen")
            .args(["--crate", "qaudio-ffi", "--lang", "C", "--output"])
            .arg(&generated)
            .current_dir(&crate_dir)
            .status()
            .is_ok_and(|s| s.success());
        if ok {
            println!("cargo:warning=qaudio-ffi: header generated -> {}", generated.display());
            return;
        }
        println!("cargo:warning=qaudio-ffi: cbindgen failed; using include/qaudio.h");
    }

    fs::copy(&checked_in, &generated).expect("failed to copy include/qaudio.h to OUT_DIR");
}
