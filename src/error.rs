use failure_derive::Fail;

/// A failed step of an experiment. These abort the experiment that issued them, but not the
/// whole run.
#[derive(Debug, Fail)]
pub enum StepError {
    #[fail(display = "`{}` is not installed or not in PATH", program)]
    ToolMissing { program: String },

    #[fail(display = "`{}` failed ({})", command, status)]
    Failed {
        command: String,
        status: std::process::ExitStatus,
    },
}

/// Is `err` something an experiment may give up on (a failed or missing command, a broken
/// SSH session) rather than a bug in the reduction code?
pub fn is_step_failure(err: &failure::Error) -> bool {
    err.downcast_ref::<StepError>().is_some() || err.downcast_ref::<spurs::SshError>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn step_errors_are_recognized() {
        let missing: failure::Error = StepError::ToolMissing {
            program: "latexmk".into(),
        }
        .into();
        assert!(is_step_failure(&missing));
        assert!(missing.to_string().contains("latexmk"));

        let failed: failure::Error = StepError::Failed {
            command: "ssh cloud-48 true".into(),
            status: std::process::ExitStatus::from_raw(256),
        }
        .into();
        assert!(is_step_failure(&failed));
        assert!(failed.to_string().contains("ssh cloud-48 true"));

        let other = failure::format_err!("Index contains duplicate entries");
        assert!(!is_step_failure(&other));
    }
}
