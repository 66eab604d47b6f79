//! The reflex executable.

fn main() {
    if let Some(exit_code) = reflex_bin::run_app().err() {
        ::std::process::exit(exit_code.into());
    }
}
