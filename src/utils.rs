use indicatif::{ProgressBar, ProgressStyle};

pub fn create_progress_bar(quiet: bool, len: usize) -> ProgressBar {
    if quiet {
        ProgressBar::hidden()
    } else {
        let style = ProgressStyle::with_template("{pos}/{len} {wide_bar} eta {eta}")
            .expect("static progress template");
        ProgressBar::new(len as u64).with_style(style)
    }
}
