//! Remote transfer policy

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOp {
    Scp,
    Rsync,
}

impl fmt::Display for TransferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scp => write!(f, "scp"),
            Self::Rsync => write!(f, "rsync"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub op: TransferOp,
    pub src_is_remote: bool,
    pub dest_is_remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Which transfer directions are allowed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyGate {
    pub pull: bool,
    pub push: bool,
}

impl PolicyGate {
    pub fn new(pull: bool, push: bool) -> Self {
        Self { pull, push }
    }

    pub fn evaluate(&self, request: &TransferRequest) -> Verdict {
        if request.src_is_remote && !self.pull {
            return Verdict::Reject(format!(
                "{} from a remote source requires pull to be enabled",
                request.op
            ));
        }
        if request.dest_is_remote && !self.push {
            return Verdict::Reject(format!(
                "{} to a remote destination requires push to be enabled",
                request.op
            ));
        }
        Verdict::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(src_is_remote: bool, dest_is_remote: bool) -> TransferRequest {
        TransferRequest {
            op: TransferOp::Scp,
            src_is_remote,
            dest_is_remote,
        }
    }

    #[test]
    fn test_local_copy_always_accepted() {
        assert!(PolicyGate::new(false, false).evaluate(&request(false, false)).is_accepted());
    }

    #[test]
    fn test_push_gate() {
        assert!(!PolicyGate::new(true, false).evaluate(&request(false, true)).is_accepted());
        assert!(PolicyGate::new(false, true).evaluate(&request(false, true)).is_accepted());
    }

    #[test]
    fn test_pull_gate() {
        assert!(!PolicyGate::new(false, true).evaluate(&request(true, false)).is_accepted());
        assert!(PolicyGate::new(true, false).evaluate(&request(true, false)).is_accepted());
    }

    #[test]
    fn test_remote_to_remote_needs_both() {
        assert!(!PolicyGate::new(true, false).evaluate(&request(true, true)).is_accepted());
        assert!(PolicyGate::new(true, true).evaluate(&request(true, true)).is_accepted());
    }
}
