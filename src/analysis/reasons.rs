use crate::graph::{DeclarationId, ReferenceKind};
use serde::Serialize;
use std::collections::BTreeSet;

/// Why a declaration is kept.
///
/// Live reasons need the declaration's body; structural ones only need it to
/// exist so retained code compiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InclusionReason {
    EntrypointMethod,
    EntrypointClass,
    Referenced {
        from: DeclarationId,
        kind: ReferenceKind,
        live: bool,
    },
    TransitiveCtorForSubclass {
        from: DeclarationId,
        live: bool,
    },
    NestParent {
        nested: DeclarationId,
    },
    MemberOwner {
        member: DeclarationId,
    },
    Supertype {
        sub: DeclarationId,
    },
    Overrides {
        base: DeclarationId,
        live: bool,
    },
    OverriddenBy {
        derived: DeclarationId,
    },
    ExternalOverride {
        live: bool,
    },
    Initialization {
        trigger: DeclarationId,
        live: bool,
    },
    OwnerRetained {
        owner: DeclarationId,
        live: bool,
    },
    RequiredConstructor {
        owner: DeclarationId,
    },
    CoverageExecuted,
    Unresolved {
        from: DeclarationId,
    },
}

impl InclusionReason {
    pub fn is_live(&self) -> bool {
        match self {
            InclusionReason::EntrypointMethod
            | InclusionReason::CoverageExecuted
            | InclusionReason::Unresolved { .. } => true,
            InclusionReason::Referenced { live, .. }
            | InclusionReason::TransitiveCtorForSubclass { live, .. }
            | InclusionReason::Overrides { live, .. }
            | InclusionReason::ExternalOverride { live }
            | InclusionReason::Initialization { live, .. }
            | InclusionReason::OwnerRetained { live, .. } => *live,
            InclusionReason::EntrypointClass
            | InclusionReason::NestParent { .. }
            | InclusionReason::MemberOwner { .. }
            | InclusionReason::Supertype { .. }
            | InclusionReason::OverriddenBy { .. }
            | InclusionReason::RequiredConstructor { .. } => false,
        }
    }

    /// Reasons meaning an instance of the carrying class (or the class
    /// owning the carrying constructor) gets created
    pub fn is_instantiation(&self) -> bool {
        matches!(
            self,
            InclusionReason::Referenced {
                kind: ReferenceKind::Instantiation,
                ..
            } | InclusionReason::TransitiveCtorForSubclass { .. }
                | InclusionReason::EntrypointMethod
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            InclusionReason::EntrypointMethod => "entrypoint-method",
            InclusionReason::EntrypointClass => "entrypoint-class",
            InclusionReason::Referenced { .. } => "referenced",
            InclusionReason::TransitiveCtorForSubclass { .. } => "ctor-chain",
            InclusionReason::NestParent { .. } => "nest-parent",
            InclusionReason::MemberOwner { .. } => "member-owner",
            InclusionReason::Supertype { .. } => "supertype",
            InclusionReason::Overrides { .. } => "overrides",
            InclusionReason::OverriddenBy { .. } => "overridden-by",
            InclusionReason::ExternalOverride { .. } => "external-override",
            InclusionReason::Initialization { .. } => "initialization",
            InclusionReason::OwnerRetained { .. } => "owner-retained",
            InclusionReason::RequiredConstructor { .. } => "required-constructor",
            InclusionReason::CoverageExecuted => "coverage-executed",
            InclusionReason::Unresolved { .. } => "unresolved",
        }
    }
}

impl std::fmt::Display for InclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InclusionReason::Referenced { from, kind, live } => {
                write!(f, "referenced by {} ({:?}{})", from, kind, if *live { ", live" } else { "" })
            }
            InclusionReason::TransitiveCtorForSubclass { from, .. } => write!(f, "constructor chain from {}", from),
            InclusionReason::NestParent { nested } => write!(f, "encloses {}", nested),
            InclusionReason::MemberOwner { member } => write!(f, "owns {}", member),
            InclusionReason::Supertype { sub } => write!(f, "supertype of {}", sub),
            InclusionReason::Overrides { base, .. } => write!(f, "overrides {}", base),
            InclusionReason::OverriddenBy { derived } => write!(f, "overridden by {}", derived),
            InclusionReason::Initialization { trigger, .. } => write!(f, "initialized with {}", trigger),
            InclusionReason::OwnerRetained { owner, .. } => write!(f, "kept with {}", owner),
            InclusionReason::RequiredConstructor { owner } => write!(f, "required constructor of {}", owner),
            InclusionReason::Unresolved { from } => write!(f, "unresolved reference in {}", from),
            other => f.write_str(other.label()),
        }
    }
}

/// Status flags derived from a reason set; each only ever rises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status {
    pub retained: bool,
    pub live: bool,
    pub instantiated: bool,
}

impl Status {
    pub fn of<'a>(reasons: impl IntoIterator<Item = &'a InclusionReason>) -> Self {
        reasons
            .into_iter()
            .fold(Status::default(), |status, reason| status.including(reason))
    }

    /// Status after adding one more reason
    pub fn including(self, reason: &InclusionReason) -> Self {
        Status {
            retained: true,
            live: self.live || reason.is_live(),
            instantiated: self.instantiated || reason.is_instantiation(),
        }
    }
}

/// A declaration's reasons with their cached status
#[derive(Debug, Clone, Default)]
pub struct ReasonSet {
    reasons: BTreeSet<InclusionReason>,
    status: Status,
}

impl ReasonSet {
    /// Insert a reason; returns the new status when it rose
    pub fn insert(&mut self, reason: InclusionReason) -> Option<Status> {
        let before = self.status;
        let after = before.including(&reason);
        if !self.reasons.insert(reason) {
            return None;
        }
        self.status = after;
        (after != before).then_some(after)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn reasons(&self) -> &BTreeSet<InclusionReason> {
        &self.reasons
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}
