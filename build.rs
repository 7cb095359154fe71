use chrono::Datelike;
use std::{env, process::Command};

fn git_hash(short: bool) -> String {
    let mut args = vec!["rev-parse"];
    if short {
        args.push("--short=10");
    }
    args.push("HEAD");

    Command::new("git")
        .args(&args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_default()
}

fn main() {
    #[cfg(not(unix))]
    compile_error!("botpanel relies on unix process groups and is not supported on this platform.");

    /* version attributes */
    let date = chrono::Utc::now();

    println!("cargo:rustc-env=TARGET={}", env::var("TARGET").unwrap_or_default());
    println!("cargo:rustc-env=GIT_HASH={}", git_hash(true));
    println!("cargo:rustc-env=GIT_HASH_FULL={}", git_hash(false));
    println!(
        "cargo:rustc-env=BUILD_DATE={}-{}-{}",
        date.year(),
        date.month(),
        date.day()
    );

    /* profile matching */
    match env::var("PROFILE").as_deref() {
        Ok("debug") => println!("cargo:rustc-env=PROFILE=debug"),
        Ok("release") => println!("cargo:rustc-env=PROFILE=release"),
        _ => println!("cargo:rustc-env=PROFILE=none"),
    }

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
