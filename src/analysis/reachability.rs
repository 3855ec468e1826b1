//! Reason-tagged reachability over a built [`SourceContext`].
//!
//! A declaration is (re)processed whenever its [`Status`] rises. Processing
//! emits structural reasons unconditionally and live reasons only when the
//! declaration is live, so the final reason sets are the unique fixed point
//! whatever order the worklist drains in.

use super::reasons::{InclusionReason, Status};
use super::{Granularity, Seeding};
use crate::cache::RunCache;
use crate::graph::{
    Declaration, DeclarationId, DeclarationKind, Reference, ReferenceKind, SourceContext,
    SuperRelation, TypeNesting, TypeTarget,
};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityOptions {
    pub granularity: Granularity,
    pub seeding: Seeding,
    pub assertions_enabled: bool,
    pub parallelism: usize,
}

impl Default for ReachabilityOptions {
    fn default() -> Self {
        Self {
            granularity: Granularity::Member,
            seeding: Seeding::Static,
            assertions_enabled: false,
            parallelism: 1,
        }
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilityStats {
    pub seeds: usize,
    pub retained: usize,
    pub live: usize,
    pub rounds: usize,
    pub required_constructors: usize,
}

type Addition = (DeclarationId, InclusionReason);

pub struct ReachabilityEngine<'a> {
    context: &'a SourceContext,
    cache: &'a RunCache,
    options: ReachabilityOptions,
    pool: Option<ThreadPool>,
}

impl<'a> ReachabilityEngine<'a> {
    pub fn new(context: &'a SourceContext, cache: &'a RunCache, options: ReachabilityOptions) -> Self {
        let pool = if options.parallelism > 1 {
            match ThreadPoolBuilder::new().num_threads(options.parallelism).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Falling back to sequential reachability: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            context,
            cache,
            options,
            pool,
        }
    }

    pub fn options(&self) -> &ReachabilityOptions {
        &self.options
    }

    /// Run to the fixed point from the given seeds
    pub fn run(&self, seeds: &[Addition]) -> ReachabilityStats {
        let mut stats = ReachabilityStats::default();
        let mut pending = Vec::new();
        for (id, reason) in seeds {
            if !self.context.contains(id) {
                warn!("Seed {} is not a source declaration", id);
                continue;
            }
            stats.seeds += 1;
            if self.cache.add_reason(id, reason.clone()).is_some() {
                pending.push(id.clone());
            }
        }

        loop {
            stats.rounds += 1;
            self.propagate(std::mem::take(&mut pending));

            pending = self.apply(self.global_reasons());
            if !pending.is_empty() {
                continue;
            }

            let required = self.required_constructors();
            stats.required_constructors += required.len();
            pending = self.apply(required);
            if pending.is_empty() {
                break;
            }
        }

        let retained = self.cache.retained_ids();
        stats.retained = retained.len();
        stats.live = retained.iter().filter(|id| self.cache.status(id).live).count();
        info!(
            "Reachability: {} retained ({} live) after {} rounds",
            stats.retained, stats.live, stats.rounds
        );
        stats
    }

    fn apply(&self, additions: Vec<Addition>) -> Vec<DeclarationId> {
        let mut risen = Vec::new();
        for (id, reason) in additions {
            trace!("{} <- {}", id, reason);
            if self.cache.add_reason(&id, reason).is_some() {
                risen.push(id);
            }
        }
        risen
    }

    /// Drain the worklist, partitioning it across the pool when there is one
    fn propagate(&self, pending: Vec<DeclarationId>) {
        match &self.pool {
            Some(pool) if pending.len() > 1 => {
                let workers = self.options.parallelism.max(1);
                let chunk = pending.len().div_ceil(workers);
                debug!("Propagating {} seeds in chunks of {}", pending.len(), chunk);
                pool.install(|| {
                    pending
                        .par_chunks(chunk)
                        .for_each(|part| self.drain(part.to_vec()));
                });
            }
            _ => self.drain(pending),
        }
    }

    fn drain(&self, mut worklist: Vec<DeclarationId>) {
        while let Some(id) = worklist.pop() {
            self.process(&id, &mut worklist);
        }
    }

    fn add(&self, id: &DeclarationId, reason: InclusionReason, worklist: &mut Vec<DeclarationId>) {
        if self.cache.add_reason(id, reason).is_some() {
            worklist.push(id.clone());
        }
    }

    fn process(&self, id: &DeclarationId, worklist: &mut Vec<DeclarationId>) {
        let status = self.cache.status(id);
        if !status.retained {
            return;
        }
        let Some(decl) = self.context.get(id) else {
            return;
        };

        if decl.kind.is_member() {
            if let Some(owner) = self.context.owner_type(id) {
                self.add(&owner.id, InclusionReason::MemberOwner { member: id.clone() }, worklist);
            }
        }

        if decl.kind.is_type() {
            self.process_type(decl, status, worklist);
        }

        if decl.kind == DeclarationKind::Constructor {
            self.implicit_super_call(decl, status, worklist);
            if status.live {
                if let Some(owner) = self.context.owner_type(id) {
                    self.initialize_instance(&owner.id, id, worklist);
                }
            }
        }

        if status.live && decl.kind.is_member() {
            if let Some(owner) = self.context.owner_type(id) {
                self.initialize_class(&owner.id, worklist);
            }
        }

        for (target, reference) in self.context.graph().get_references_from(id) {
            self.follow(decl, status, target, reference, worklist);
        }
    }

    fn process_type(&self, decl: &Declaration, status: Status, worklist: &mut Vec<DeclarationId>) {
        let id = &decl.id;

        if let Some(outer) = self.context.owner_type(id) {
            self.add(&outer.id, InclusionReason::NestParent { nested: id.clone() }, worklist);
        }
        if let Some(parent) = decl.parent.as_ref().and_then(|p| self.context.get(p)) {
            if !parent.kind.is_type() {
                self.add(&parent.id, InclusionReason::NestParent { nested: id.clone() }, worklist);
            }
        }

        for link in self.context.supertypes(id) {
            let TypeTarget::Source(sup) = &link.target else {
                continue;
            };
            let keep = link.relation == SuperRelation::Superclass
                || decl.is_anonymous()
                || self.options.granularity == Granularity::Class;
            if keep {
                self.add(sup, InclusionReason::Supertype { sub: id.clone() }, worklist);
            }
        }

        match decl.kind {
            DeclarationKind::Enum => {
                for constant in self.context.members(id).filter(|m| m.kind == DeclarationKind::EnumCase) {
                    self.add(&constant.id, owner_retained(id, true), worklist);
                }
            }
            DeclarationKind::Annotation => {
                for element in self.context.members(id).filter(|m| m.kind == DeclarationKind::Method) {
                    self.add(&element.id, owner_retained(id, true), worklist);
                }
            }
            _ => {}
        }
        if self.options.granularity == Granularity::Class {
            for member in self.context.members(id) {
                self.add(&member.id, owner_retained(id, true), worklist);
            }
        }

        let implicit_ctor = self.context.constructors(id).is_empty()
            && matches!(decl.kind, DeclarationKind::Class | DeclarationKind::Enum);
        if implicit_ctor && status.instantiated && !decl.is_anonymous() {
            if let Some(target) = self.super_constructor(id) {
                self.add(
                    &target,
                    InclusionReason::TransitiveCtorForSubclass {
                        from: id.clone(),
                        live: status.live,
                    },
                    worklist,
                );
            }
        }

        if status.live {
            self.initialize_class(id, worklist);
            if implicit_ctor && status.instantiated {
                self.initialize_instance(id, id, worklist);
            }
        }
    }

    /// A constructor without `this(..)`/`super(..)` chains to the
    /// superclass no-arg constructor
    fn implicit_super_call(&self, ctor: &Declaration, status: Status, worklist: &mut Vec<DeclarationId>) {
        let explicit = self
            .context
            .graph()
            .get_references_from(&ctor.id)
            .iter()
            .any(|(_, r)| r.kind == ReferenceKind::Delegation);
        if explicit || ctor.extent.ctor_invocation.is_some() {
            return;
        }
        let Some(owner) = self.context.owner_type(&ctor.id) else {
            return;
        };
        if let Some(target) = self.super_constructor(&owner.id) {
            self.add(
                &target,
                InclusionReason::TransitiveCtorForSubclass {
                    from: ctor.id.clone(),
                    live: status.live,
                },
                worklist,
            );
        }
    }

    /// The superclass constructor an implicit `super()` runs: the source
    /// superclass's no-arg constructor, or the superclass itself when it
    /// only has the implicit one
    fn super_constructor(&self, type_id: &DeclarationId) -> Option<DeclarationId> {
        let superclass = self.context.source_superclass(type_id)?;
        let ctors = self.context.constructors(&superclass.id);
        if ctors.is_empty() {
            return Some(superclass.id.clone());
        }
        ctors
            .iter()
            .find(|c| {
                let signature = c.signature.as_ref();
                let arity = signature.map(|s| s.arity()).unwrap_or(0);
                let varargs = signature.map(|s| s.is_varargs()).unwrap_or(false);
                arity == 0 || (arity == 1 && varargs)
            })
            .map(|c| c.id.clone())
    }

    fn initialize_class(&self, type_id: &DeclarationId, worklist: &mut Vec<DeclarationId>) {
        let reason = InclusionReason::Initialization {
            trigger: type_id.clone(),
            live: true,
        };
        for member in self.context.members(type_id) {
            if member.is_static && self.runs_on_initialization(member) {
                self.add(&member.id, reason.clone(), worklist);
            }
        }
    }

    fn initialize_instance(&self, type_id: &DeclarationId, trigger: &DeclarationId, worklist: &mut Vec<DeclarationId>) {
        let reason = InclusionReason::Initialization {
            trigger: trigger.clone(),
            live: true,
        };
        for member in self.context.members(type_id) {
            if !member.is_static && self.runs_on_initialization(member) {
                self.add(&member.id, reason.clone(), worklist);
            }
        }
    }

    /// Initializer blocks and fields whose initializer does more than
    /// load a constant
    fn runs_on_initialization(&self, member: &Declaration) -> bool {
        match member.kind {
            DeclarationKind::Initializer => true,
            DeclarationKind::Field => member
                .extent
                .initializer
                .and_then(|range| {
                    let unit = self.context.unit_of(&member.id)?;
                    unit.source.get(range.start..range.end).map(|t| !is_trivial_initializer(t))
                })
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Turn one outgoing edge into a reason on its target
    fn follow(
        &self,
        decl: &Declaration,
        status: Status,
        target: &Declaration,
        reference: &Reference,
        worklist: &mut Vec<DeclarationId>,
    ) {
        let from = &decl.id;
        let ctx = reference.context;

        match reference.kind {
            ReferenceKind::Inheritance => return,
            ReferenceKind::Delegation => {
                self.add(
                    &target.id,
                    InclusionReason::TransitiveCtorForSubclass {
                        from: from.clone(),
                        live: status.live,
                    },
                    worklist,
                );
                return;
            }
            _ => {}
        }

        let live = if ctx.in_annotation {
            Some(true)
        } else if !ctx.in_body {
            Some(false)
        } else if ctx.in_ctor_invocation {
            Some(status.live && self.live_body_reference(target, reference))
        } else if status.live {
            Some(self.live_body_reference(target, reference))
        } else if reference.kind == ReferenceKind::Import
            || (target.kind.is_type()
                && !is_local_or_anonymous(target)
                && reference.kind != ReferenceKind::Instantiation)
        {
            Some(false)
        } else {
            None
        };

        let Some(live) = live else {
            return;
        };
        let reason = if reference.conservative && live {
            InclusionReason::Unresolved { from: from.clone() }
        } else {
            InclusionReason::Referenced {
                from: from.clone(),
                kind: reference.kind,
                live,
            }
        };
        self.add(&target.id, reason, worklist);
    }

    fn live_body_reference(&self, target: &Declaration, reference: &Reference) -> bool {
        if reference.context.in_assertion && !self.options.assertions_enabled {
            return false;
        }
        !(self.options.seeding == Seeding::Coverage && target.kind.is_callable())
    }

    /// Rules evaluated over the whole retained set once the worklist is empty
    fn global_reasons(&self) -> Vec<Addition> {
        let mut additions = Vec::new();
        let mut dispatch = DispatchIndex::new(self.context, self.cache);

        for id in self.cache.retained_ids() {
            let Some(decl) = self.context.get(&id) else {
                continue;
            };
            let status = self.cache.status(&id);

            if decl.kind == DeclarationKind::Method {
                for base in self.context.overridden_bases(&id) {
                    if self.owner_retained(base) {
                        additions.push((base.clone(), InclusionReason::OverriddenBy { derived: id.clone() }));
                    }
                    if self.cache.status(base).live {
                        additions.push((
                            id.clone(),
                            InclusionReason::Overrides {
                                base: base.clone(),
                                live: true,
                            },
                        ));
                    }
                }

                for derived in self.context.overriders(&id) {
                    let Some(owner) = self.context.owner_type(derived) else {
                        continue;
                    };
                    if !self.cache.is_retained(&owner.id) {
                        continue;
                    }
                    // dispatch may land in the override whichever way the base was seeded
                    let reason = if dispatch.reaches(&owner.id) {
                        Some(status.live)
                    } else {
                        // a concrete class must keep implementing a retained abstract method
                        (decl.is_abstract && owner.kind == DeclarationKind::Class && !owner.is_abstract)
                            .then_some(false)
                    };
                    if let Some(live) = reason {
                        additions.push((
                            derived.clone(),
                            InclusionReason::Overrides { base: id.clone(), live },
                        ));
                    }
                }
            }

            if decl.kind.is_type() {
                let dispatched = dispatch.reaches(&id);
                for member in self.context.members(&id) {
                    if member.kind == DeclarationKind::Method && self.context.is_external_override(&member.id) {
                        let live = self.options.seeding == Seeding::Static && dispatched;
                        additions.push((member.id.clone(), InclusionReason::ExternalOverride { live }));
                    }
                }
                if let Some(sam) = self.context.single_abstract_method(&id) {
                    additions.push((
                        sam,
                        InclusionReason::OwnerRetained {
                            owner: id.clone(),
                            live: status.live,
                        },
                    ));
                }
            }
        }
        additions
    }

    fn owner_retained(&self, member: &DeclarationId) -> bool {
        self.context
            .owner_type(member)
            .map(|owner| self.cache.is_retained(&owner.id))
            .unwrap_or(false)
    }

    /// Retained classes whose explicit constructors are all unreferenced
    /// keep their preferred one
    fn required_constructors(&self) -> Vec<Addition> {
        let mut additions = Vec::new();
        for id in self.cache.retained_ids() {
            let Some(decl) = self.context.get(&id) else {
                continue;
            };
            if !matches!(decl.kind, DeclarationKind::Class | DeclarationKind::Enum) || decl.is_anonymous() {
                continue;
            }
            let ctors = self.context.constructors(&id);
            if ctors.is_empty() || ctors.iter().any(|c| self.cache.is_retained(&c.id)) {
                continue;
            }
            let preferred = ctors
                .iter()
                .find(|c| c.arity() == 0)
                .or_else(|| ctors.first())
                .map(|c| c.id.clone());
            if let Some(ctor) = preferred {
                debug!("Keeping {} as the required constructor of {}", ctor, id);
                additions.push((ctor, InclusionReason::RequiredConstructor { owner: id }));
            }
        }
        additions
    }
}

fn owner_retained(owner: &DeclarationId, live: bool) -> InclusionReason {
    InclusionReason::OwnerRetained {
        owner: owner.clone(),
        live,
    }
}

fn is_local_or_anonymous(decl: &Declaration) -> bool {
    matches!(decl.nesting, Some(TypeNesting::Local) | Some(TypeNesting::Anonymous))
}

/// Literal initializers (`0`, `-1L`, `"x"`, `'c'`, `true`, `null`) never run
/// code when the class or instance initializes
pub(crate) fn is_trivial_initializer(text: &str) -> bool {
    static LITERAL: OnceLock<Option<Regex>> = OnceLock::new();
    let literal = LITERAL.get_or_init(|| {
        Regex::new(
            r#"^(?:true|false|null|-?[0-9][0-9a-fA-FxXlLdDfF_.]*|"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.+)')$"#,
        )
        .ok()
    });
    let text = text.trim();
    literal.as_ref().map(|re| re.is_match(text)).unwrap_or(false)
}

/// Memoized "can a virtual call land in this type" check: the type or one
/// of its source subtypes is instantiated
pub(crate) struct DispatchIndex<'a> {
    context: &'a SourceContext,
    cache: &'a RunCache,
    memo: HashMap<DeclarationId, bool>,
}

impl<'a> DispatchIndex<'a> {
    pub(crate) fn new(context: &'a SourceContext, cache: &'a RunCache) -> Self {
        Self {
            context,
            cache,
            memo: HashMap::new(),
        }
    }

    pub(crate) fn reaches(&mut self, type_id: &DeclarationId) -> bool {
        if let Some(known) = self.memo.get(type_id) {
            return *known;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([type_id.clone()]);
        let mut found = false;
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if self.instantiated(&current) {
                found = true;
                break;
            }
            queue.extend(self.context.subtypes(&current).iter().cloned());
        }
        self.memo.insert(type_id.clone(), found);
        found
    }

    /// The type or one of its constructors carries an instantiation reason
    fn instantiated(&self, type_id: &DeclarationId) -> bool {
        self.cache.status(type_id).instantiated
            || self
                .context
                .constructors(type_id)
                .iter()
                .any(|c| self.cache.status(&c.id).instantiated)
    }
}
