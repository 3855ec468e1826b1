//! Decision tests
//!
//! End-to-end reductions of the commons-compress fixture in every reducer
//! kind, checked for memo stability, thread-count independence and the
//! consistency rules between types, members, overrides and entrypoints.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use testprune::analysis::{
    DecisionEngine, DecisionError, EntrypointSpec, Granularity, InclusionReason, ReachabilityEngine,
    ReachabilityOptions, Seeding, TransformDecision,
};
use testprune::cache::RunCache;
use testprune::config::Config;
use testprune::coverage::{parse_coverage_file, CoverageReport, JacocoParser};
use testprune::discovery::FileFinder;
use testprune::graph::{DeclarationId, DeclarationKind, GraphBuilder, ParallelGraphBuilder, SourceContext};
use testprune::reducer::{ReduceError, Reducer, ReducerKind, ReducerOptions, Reduction};

const ENTRY: &str = "org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#shortTextFilesAreNoTARs";
const ENTRY_METHOD: &str =
    "org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#shortTextFilesAreNoTARs()";
const ARCHIVE_EXCEPTION: &str = "org.apache.commons.compress.archivers.ArchiveException";

const KINDS: [ReducerKind; 4] = [
    ReducerKind::ClassStatic,
    ReducerKind::MemberStatic,
    ReducerKind::ClassCoverage,
    ReducerKind::MemberCoverage,
];

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/compress")
}

fn build_fixture() -> SourceContext {
    let config = Config {
        source_roots: vec![PathBuf::from("src/main/java"), PathBuf::from("src/test/java")],
        ..Config::default()
    };
    let files = FileFinder::new(&config).find_files(&fixture_dir()).unwrap();
    ParallelGraphBuilder::new().build_from_files(&files).unwrap()
}

fn fixture_coverage() -> CoverageReport {
    parse_coverage_file(&fixture_dir().join("jacoco.xml")).unwrap()
}

fn options(kind: ReducerKind, parallelism: usize) -> ReducerOptions {
    ReducerOptions {
        granularity: kind.granularity(),
        seeding: kind.seeding(),
        parallelism,
        assertions_enabled: false,
    }
}

fn reduce_fixture(ctx: &SourceContext, kind: ReducerKind, parallelism: usize) -> Reduction {
    let coverage = fixture_coverage();
    Reducer::new(ctx, options(kind, parallelism))
        .reduce(&EntrypointSpec::parse(ENTRY).unwrap(), Some(&coverage))
        .unwrap()
}

fn id(s: &str) -> DeclarationId {
    DeclarationId::new(s)
}

/// Declarations reachable from the exception type alone
fn reachable_from(ctx: &SourceContext, type_name: &str) -> BTreeSet<DeclarationId> {
    let cache = RunCache::new();
    let mut seeds = vec![(id(type_name), InclusionReason::EntrypointClass)];
    for ctor in ctx.constructors(&id(type_name)) {
        seeds.push((ctor.id.clone(), InclusionReason::EntrypointMethod));
    }
    ReachabilityEngine::new(ctx, &cache, ReachabilityOptions::default()).run(&seeds);
    cache.retained_ids().into_iter().collect()
}

/// A virtual call can land in the type: it or a source subtype is instantiated
fn dispatch_reaches(ctx: &SourceContext, cache: &RunCache, type_id: &DeclarationId) -> bool {
    let mut seen = BTreeSet::new();
    let mut queue = vec![type_id.clone()];
    while let Some(current) = queue.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        let instantiated = cache.status(&current).instantiated
            || ctx
                .constructors(&current)
                .iter()
                .any(|c| cache.status(&c.id).instantiated);
        if instantiated {
            return true;
        }
        queue.extend(ctx.subtypes(&current).iter().cloned());
    }
    false
}

// ============================================================================
// Determinism
// ============================================================================

mod determinism {
    use super::*;

    #[test]
    fn test_parallel_reduction_matches_sequential() {
        let ctx = build_fixture();
        let reachable = reachable_from(&ctx, ARCHIVE_EXCEPTION);
        assert!(reachable.contains(&id("org.apache.commons.compress.CompressException")));

        let sequential = reduce_fixture(&ctx, ReducerKind::MemberStatic, 1);
        let parallel = reduce_fixture(&ctx, ReducerKind::MemberStatic, 4);
        for decl in &reachable {
            assert_eq!(
                sequential.decision(decl),
                parallel.decision(decl),
                "{} differs between 1 and 4 threads",
                decl
            );
        }
        assert_eq!(sequential.decisions, parallel.decisions);
        assert_eq!(sequential.reasons, parallel.reasons);
    }

    #[test]
    fn test_every_kind_is_thread_count_independent() {
        let ctx = build_fixture();
        for kind in KINDS {
            let sequential = reduce_fixture(&ctx, kind, 1);
            let parallel = reduce_fixture(&ctx, kind, 3);
            assert_eq!(sequential.decisions, parallel.decisions, "{}", kind);
        }
    }

    #[test]
    fn test_uncached_decisions_match_memo() {
        let ctx = build_fixture();
        let coverage = fixture_coverage();
        let spec = EntrypointSpec::parse(ENTRY).unwrap();
        for kind in KINDS {
            let reducer = Reducer::new(&ctx, options(kind, 2));
            let reduction = reducer.reduce(&spec, Some(&coverage)).unwrap();
            let engine = DecisionEngine::new(&ctx, reducer.cache());
            for decl in ctx.declaration_ids() {
                let memo = engine.decide(&decl).unwrap();
                assert_eq!(engine.decide_no_cache(&decl).unwrap(), memo, "{} in {}", decl, kind);
                assert_eq!(reduction.decision(&decl), Some(memo));
            }
        }
    }

    #[test]
    fn test_reducer_is_reusable() {
        let ctx = build_fixture();
        let reducer = Reducer::new(&ctx, ReducerOptions::default());
        let spec = EntrypointSpec::parse(ENTRY).unwrap();
        let first = reducer.reduce(&spec, None).unwrap();
        assert!(!reducer.cache().is_empty());
        let second = reducer.reduce(&spec, None).unwrap();
        assert_eq!(first.decisions, second.decisions);

        reducer.clear_cache();
        assert!(reducer.cache().is_empty());
    }
}

// ============================================================================
// Consistency
// ============================================================================

mod consistency {
    use super::*;

    #[test]
    fn test_entrypoint_is_never_removed() {
        let ctx = build_fixture();
        let coverage = fixture_coverage();
        let spec = EntrypointSpec::parse(ENTRY).unwrap();
        for kind in KINDS {
            let reducer = Reducer::new(&ctx, options(kind, 1));
            let reduction = reducer.reduce(&spec, Some(&coverage)).unwrap();
            assert_eq!(reduction.entry_methods, vec![id(ENTRY_METHOD)]);
            assert_eq!(reduction.decision(&id(ENTRY_METHOD)), Some(TransformDecision::NoOp), "{}", kind);

            let engine = DecisionEngine::new(&ctx, reducer.cache());
            assert!(!engine.is_unused_for_removal(&id(ENTRY_METHOD)));
            assert_eq!(
                reduction.decision(&id("org.apache.commons.compress.archivers.ArchiveStreamFactoryTest")),
                Some(TransformDecision::NoOp)
            );
        }
    }

    #[test]
    fn test_types_and_imports_are_kept_or_removed() {
        let ctx = build_fixture();
        for kind in KINDS {
            let reduction = reduce_fixture(&ctx, kind, 1);
            for decl in ctx.declarations() {
                if decl.kind.is_type() || decl.kind == DeclarationKind::Import {
                    assert_ne!(reduction.decision(&decl.id), Some(TransformDecision::Stub), "{}", decl.id);
                }
            }
        }
    }

    #[test]
    fn test_members_of_removed_types_are_removed() {
        let ctx = build_fixture();
        for kind in KINDS {
            let reduction = reduce_fixture(&ctx, kind, 1);
            for decl in ctx.declarations().filter(|d| d.kind.is_member()) {
                let Some(owner) = ctx.owner_type(&decl.id) else { continue };
                if reduction.decision(&owner.id) == Some(TransformDecision::Remove) {
                    assert_eq!(reduction.decision(&decl.id), Some(TransformDecision::Remove), "{}", decl.id);
                }
            }
        }
    }

    #[test]
    fn test_overrides_are_kept_as_fully_as_retained_bases() {
        let ctx = build_fixture();
        for kind in KINDS {
            let reducer = Reducer::new(&ctx, options(kind, 1));
            let reduction = reducer
                .reduce(&EntrypointSpec::parse(ENTRY).unwrap(), Some(&fixture_coverage()))
                .unwrap();
            for decl in ctx.declarations().filter(|d| d.kind == DeclarationKind::Method) {
                let Some(own) = reduction.decision(&decl.id) else { continue };
                let owner = ctx.owner_type(&decl.id).unwrap();
                if own == TransformDecision::Remove
                    && (reduction.decision(&owner.id) == Some(TransformDecision::Remove)
                        || !dispatch_reaches(&ctx, reducer.cache(), &owner.id))
                {
                    continue;
                }
                for base in ctx.overridden_bases(&decl.id) {
                    if !reducer.cache().is_retained(base) {
                        continue;
                    }
                    let base_decision = reduction.decision(base).unwrap();
                    assert!(
                        own >= base_decision,
                        "{} is {} below its base {} ({}) in {}",
                        decl.id,
                        own,
                        base,
                        base_decision,
                        kind
                    );
                }
            }
        }
    }

    #[test]
    fn test_override_of_executed_base_survives_coverage_seeding() {
        let mut builder = GraphBuilder::new();
        for (path, source) in [
            ("a/Base.java", "package a;\n\nclass Base {\n    void m() {\n    }\n}\n"),
            ("a/Sub.java", "package a;\n\nclass Sub extends Base {\n    void m() {\n    }\n}\n"),
            (
                "a/Main.java",
                "package a;\n\nclass Main {\n    void entry() {\n        Base b = new Base();\n        b.m();\n        Base s = new Sub();\n    }\n}\n",
            ),
        ] {
            builder.add_source(Path::new(path), source).unwrap();
        }
        let ctx = builder.build();
        let coverage = JacocoParser::new()
            .parse_xml(
                r#"<report name="dispatch">
  <package name="a">
    <class name="a/Base" sourcefilename="Base.java">
      <method name="&lt;init&gt;" desc="()V" line="3"><counter type="METHOD" missed="0" covered="1"/></method>
      <method name="m" desc="()V" line="5"><counter type="METHOD" missed="0" covered="1"/></method>
    </class>
    <class name="a/Sub" sourcefilename="Sub.java">
      <method name="&lt;init&gt;" desc="()V" line="3"><counter type="METHOD" missed="0" covered="1"/></method>
      <method name="m" desc="()V" line="5"><counter type="METHOD" missed="1" covered="0"/></method>
    </class>
    <class name="a/Main" sourcefilename="Main.java">
      <method name="entry" desc="()V" line="5"><counter type="METHOD" missed="0" covered="1"/></method>
    </class>
  </package>
</report>"#,
            )
            .unwrap();

        let reducer = Reducer::new(&ctx, options(ReducerKind::MemberCoverage, 1));
        let reduction = reducer
            .reduce(&EntrypointSpec::parse("a.Main#entry").unwrap(), Some(&coverage))
            .unwrap();
        assert!(dispatch_reaches(&ctx, reducer.cache(), &id("a.Sub")));
        assert_eq!(reduction.decision(&id("a.Base#m()")), Some(TransformDecision::NoOp));
        assert_eq!(reduction.decision(&id("a.Sub#m()")), Some(TransformDecision::NoOp));
    }

    #[test]
    fn test_superclasses_of_kept_types_are_kept() {
        let ctx = build_fixture();
        for kind in KINDS {
            let reduction = reduce_fixture(&ctx, kind, 1);
            for decl in ctx.declarations().filter(|d| d.kind.is_type()) {
                if reduction.decision(&decl.id) != Some(TransformDecision::NoOp) {
                    continue;
                }
                if let Some(superclass) = ctx.source_superclass(&decl.id) {
                    assert_eq!(
                        reduction.decision(&superclass.id),
                        Some(TransformDecision::NoOp),
                        "{} extends removed {}",
                        decl.id,
                        superclass.id
                    );
                }
            }
        }
    }
}

// ============================================================================
// Verdicts
// ============================================================================

mod verdicts {
    use super::*;

    #[test]
    fn test_member_static_verdicts_on_fixture() {
        let ctx = build_fixture();
        let reduction = reduce_fixture(&ctx, ReducerKind::MemberStatic, 1);
        let decision = |key: &str| reduction.decision(&id(key));

        assert_eq!(decision(ARCHIVE_EXCEPTION), Some(TransformDecision::NoOp));
        assert_eq!(
            decision("org.apache.commons.compress.compressors.CompressorException"),
            Some(TransformDecision::Remove)
        );
        assert_eq!(
            decision("org.apache.commons.compress.archivers.ArchiveOutputStream"),
            Some(TransformDecision::Remove)
        );
        assert_eq!(
            decision("org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#tarEntryNames()"),
            Some(TransformDecision::Remove)
        );
        assert_eq!(
            decision("org.apache.commons.compress.AbstractTest#setUp()"),
            Some(TransformDecision::NoOp)
        );
        assert_eq!(
            decision("org.apache.commons.compress.AbstractTest#getFile(String)"),
            Some(TransformDecision::Remove)
        );
        assert_eq!(
            decision("org.apache.commons.compress.archivers.ArchiveStreamFactory#detect(InputStream)"),
            Some(TransformDecision::NoOp)
        );
    }

    #[test]
    fn test_class_granularity_keeps_whole_classes() {
        let ctx = build_fixture();
        let reduction = reduce_fixture(&ctx, ReducerKind::ClassStatic, 1);
        for decl in ctx.declarations().filter(|d| d.kind.is_member()) {
            let Some(owner) = ctx.owner_type(&decl.id) else { continue };
            if reduction.decision(&owner.id) == Some(TransformDecision::NoOp) {
                assert_eq!(reduction.decision(&decl.id), Some(TransformDecision::NoOp), "{}", decl.id);
            }
        }
    }

    #[test]
    fn test_coverage_seeding_stubs_unexecuted_code() {
        let ctx = build_fixture();
        let reduction = reduce_fixture(&ctx, ReducerKind::MemberCoverage, 1);
        assert!(reduction.stats.coverage_seeds > 0);
        assert!(reduction.stats.coverage_unmatched > 0);
        // called from executed code but never executed itself
        assert_eq!(
            reduction.decision(&id(
                "org.apache.commons.compress.archivers.ArchiveStreamFactory#createArchiveInputStream(String,InputStream)"
            )),
            Some(TransformDecision::Stub)
        );
        assert_eq!(
            reduction.decision(&id("org.apache.commons.compress.archivers.ArchiveStreamFactory#detect(InputStream)")),
            Some(TransformDecision::NoOp)
        );
    }

    #[test]
    fn test_coverage_kinds_need_a_report() {
        let ctx = build_fixture();
        let result = Reducer::new(&ctx, options(ReducerKind::ClassCoverage, 1))
            .reduce(&EntrypointSpec::parse(ENTRY).unwrap(), None);
        assert!(matches!(result, Err(ReduceError::MissingCoverage)));
    }

    #[test]
    fn test_unknown_entrypoint_is_an_error() {
        let ctx = build_fixture();
        let reducer = Reducer::new(&ctx, ReducerOptions::default());
        let missing_method = reducer.reduce(
            &EntrypointSpec::parse("org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#nope").unwrap(),
            None,
        );
        assert!(matches!(missing_method, Err(ReduceError::Entrypoint(_))));
        let missing_class = reducer.reduce(&EntrypointSpec::parse("x.Nope#test").unwrap(), None);
        assert!(matches!(missing_class, Err(ReduceError::Entrypoint(_))));
    }

    #[test]
    fn test_unknown_declaration_is_fatal() {
        let ctx = build_fixture();
        let cache = RunCache::new();
        let engine = DecisionEngine::new(&ctx, &cache);
        assert!(matches!(
            engine.decide(&id("org.apache.commons.compress.Missing")),
            Err(DecisionError::UnknownDeclaration(_))
        ));
    }

    #[test]
    fn test_structural_only_member_is_stubbed() {
        let mut builder = GraphBuilder::new();
        builder
            .add_source(
                Path::new("v/Check.java"),
                "package v;\nclass Check {\n  void test() { assert valid(); }\n  boolean valid() { return true; }\n}\n",
            )
            .unwrap();
        let ctx = builder.build();
        let spec = EntrypointSpec::parse("v.Check#test").unwrap();

        let disabled = Reducer::new(&ctx, ReducerOptions::default()).reduce(&spec, None).unwrap();
        assert_eq!(disabled.decision(&id("v.Check#valid()")), Some(TransformDecision::Stub));

        let enabled = Reducer::new(
            &ctx,
            ReducerOptions {
                assertions_enabled: true,
                ..ReducerOptions::default()
            },
        )
        .reduce(&spec, None)
        .unwrap();
        assert_eq!(enabled.decision(&id("v.Check#valid()")), Some(TransformDecision::NoOp));
    }

    #[test]
    fn test_kind_round_trips_through_options() {
        for kind in KINDS {
            assert_eq!(ReducerKind::new(kind.granularity(), kind.seeding()), kind);
            assert_eq!(options(kind, 1).kind(), kind);
        }
        assert_eq!(ReducerKind::ClassCoverage.granularity(), Granularity::Class);
        assert_eq!(ReducerKind::MemberStatic.seeding(), Seeding::Static);
    }
}
