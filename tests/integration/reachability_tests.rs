//! Reachability tests
//!
//! Fixed-point properties over the commons-compress fixture (seed order,
//! thread count, constructor chaining) and the individual inclusion rules on
//! small inline programs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use testprune::analysis::{
    EntryPointDetector, EntrypointSpec, Granularity, InclusionReason, ReachabilityEngine, ReachabilityOptions,
    Seeding,
};
use testprune::cache::RunCache;
use testprune::config::Config;
use testprune::discovery::FileFinder;
use testprune::graph::{DeclarationId, DeclarationKind, GraphBuilder, ParallelGraphBuilder, SourceContext};

const ENTRY: &str = "org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#shortTextFilesAreNoTARs";

type Snapshot = BTreeMap<DeclarationId, BTreeSet<InclusionReason>>;

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

fn build(files: &[(&str, &str)]) -> SourceContext {
    let mut builder = GraphBuilder::new();
    for (path, source) in files {
        builder.add_source(Path::new(path), source).unwrap();
    }
    builder.build()
}

fn id(s: &str) -> DeclarationId {
    DeclarationId::new(s)
}

fn entry_seeds(ctx: &SourceContext, entry: &str) -> Vec<(DeclarationId, InclusionReason)> {
    let detector = EntryPointDetector::new(ctx);
    let resolved = detector
        .resolve(&EntrypointSpec::parse(entry).unwrap(), &[])
        .unwrap();
    detector.seeds(&resolved)
}

fn run(
    ctx: &SourceContext,
    seeds: &[(DeclarationId, InclusionReason)],
    options: ReachabilityOptions,
) -> Snapshot {
    let cache = RunCache::new();
    ReachabilityEngine::new(ctx, &cache, options).run(seeds);
    cache.snapshot()
}

// ============================================================================
// Fixed-point properties
// ============================================================================

mod fixed_point {
    use super::*;

    #[test]
    fn test_seed_order_does_not_matter() {
        let ctx = build_fixture();
        let seeds = entry_seeds(&ctx, ENTRY);
        assert!(seeds.len() > 2);

        let baseline = run(&ctx, &seeds, ReachabilityOptions::default());
        assert!(!baseline.is_empty());

        let mut reversed = seeds.clone();
        reversed.reverse();
        assert_eq!(run(&ctx, &reversed, ReachabilityOptions::default()), baseline);

        for shift in 1..seeds.len() {
            let mut rotated = seeds.clone();
            rotated.rotate_left(shift);
            assert_eq!(
                run(&ctx, &rotated, ReachabilityOptions::default()),
                baseline,
                "rotation by {}",
                shift
            );
        }
    }

    #[test]
    fn test_seed_order_does_not_matter_under_coverage_seeding() {
        let ctx = build_fixture();
        let mut seeds = entry_seeds(&ctx, ENTRY);
        seeds.push((
            id("org.apache.commons.compress.utils.IOUtils#readFully(InputStream,byte[])"),
            InclusionReason::CoverageExecuted,
        ));
        let options = ReachabilityOptions {
            seeding: Seeding::Coverage,
            ..ReachabilityOptions::default()
        };
        let forward = run(&ctx, &seeds, options);
        seeds.reverse();
        assert_eq!(run(&ctx, &seeds, options), forward);
    }

    #[test]
    fn test_parallel_matches_sequential_on_fixture() {
        let ctx = build_fixture();
        let seeds = entry_seeds(&ctx, ENTRY);
        for granularity in [Granularity::Member, Granularity::Class] {
            let sequential = run(
                &ctx,
                &seeds,
                ReachabilityOptions {
                    granularity,
                    ..ReachabilityOptions::default()
                },
            );
            let parallel = run(
                &ctx,
                &seeds,
                ReachabilityOptions {
                    granularity,
                    parallelism: 4,
                    ..ReachabilityOptions::default()
                },
            );
            assert_eq!(sequential, parallel, "{}", granularity);
        }
    }

    #[test]
    fn test_repeated_runs_are_idempotent() {
        let ctx = build_fixture();
        let seeds = entry_seeds(&ctx, ENTRY);
        let cache = RunCache::new();
        let engine = ReachabilityEngine::new(&ctx, &cache, ReachabilityOptions::default());
        let first = engine.run(&seeds);
        let snapshot = cache.snapshot();
        engine.run(&seeds);
        assert_eq!(cache.snapshot(), snapshot);
        assert_eq!(first.retained, snapshot.len());
    }
}

// ============================================================================
// Entrypoint seeding
// ============================================================================

mod entrypoint {
    use super::*;

    #[test]
    fn test_entry_class_ancestry_and_lifecycle() {
        let ctx = build_fixture();
        let snapshot = run(&ctx, &entry_seeds(&ctx, ENTRY), ReachabilityOptions::default());

        let abstract_test = id("org.apache.commons.compress.AbstractTest");
        assert!(snapshot[&abstract_test].contains(&InclusionReason::EntrypointClass));
        assert!(snapshot[&id("org.apache.commons.compress.AbstractTest#setUp()")]
            .contains(&InclusionReason::EntrypointMethod));
        assert!(snapshot[&id("org.apache.commons.compress.AbstractTest#tearDown()")]
            .contains(&InclusionReason::EntrypointMethod));
        assert!(!snapshot.contains_key(&id("org.apache.commons.compress.AbstractTest#getFile(String)")));
    }

    #[test]
    fn test_other_tests_in_entry_class_are_not_seeded() {
        let ctx = build_fixture();
        let snapshot = run(&ctx, &entry_seeds(&ctx, ENTRY), ReachabilityOptions::default());
        let test_class = "org.apache.commons.compress.archivers.ArchiveStreamFactoryTest";
        assert!(snapshot.contains_key(&id(&format!("{}#shortTextFilesAreNoTARs()", test_class))));
        assert!(!snapshot.contains_key(&id(&format!("{}#tarEntryNames()", test_class))));
        assert!(!snapshot.contains_key(&id(&format!("{}#detectsArSignature()", test_class))));
    }

    #[test]
    fn test_unreferenced_types_stay_out() {
        let ctx = build_fixture();
        let snapshot = run(&ctx, &entry_seeds(&ctx, ENTRY), ReachabilityOptions::default());
        assert!(!snapshot.contains_key(&id("org.apache.commons.compress.compressors.CompressorException")));
        assert!(!snapshot.contains_key(&id("org.apache.commons.compress.archivers.ArchiveOutputStream")));
        assert!(snapshot.contains_key(&id("org.apache.commons.compress.archivers.ArchiveException")));
    }
}

// ============================================================================
// Constructor chaining
// ============================================================================

mod constructors {
    use super::*;

    /// Every retained constructor of a class whose source superclass declares
    /// constructors has some retained superclass constructor to chain to
    fn assert_chaining_closed(ctx: &SourceContext, snapshot: &Snapshot) {
        for decl in ctx.declarations().filter(|d| d.kind == DeclarationKind::Constructor) {
            if !snapshot.contains_key(&decl.id) {
                continue;
            }
            let Some(owner) = ctx.owner_type(&decl.id) else { continue };
            let Some(superclass) = ctx.source_superclass(&owner.id) else { continue };
            let super_ctors = ctx.constructors(&superclass.id);
            if super_ctors.is_empty() {
                continue;
            }
            assert!(
                super_ctors.iter().any(|c| snapshot.contains_key(&c.id)),
                "{} chains to no retained constructor of {}",
                decl.id,
                superclass.id
            );
        }
    }

    #[test]
    fn test_chaining_closure_on_fixture() {
        let ctx = build_fixture();
        for granularity in [Granularity::Member, Granularity::Class] {
            let snapshot = run(
                &ctx,
                &entry_seeds(&ctx, ENTRY),
                ReachabilityOptions {
                    granularity,
                    ..ReachabilityOptions::default()
                },
            );
            assert_chaining_closed(&ctx, &snapshot);
        }
    }

    #[test]
    fn test_exception_constructor_chain() {
        let ctx = build_fixture();
        let seeds = vec![
            (
                id("org.apache.commons.compress.archivers.ArchiveException#<init>(String)"),
                InclusionReason::EntrypointMethod,
            ),
            (
                id("org.apache.commons.compress.archivers.ArchiveException"),
                InclusionReason::EntrypointClass,
            ),
        ];
        let snapshot = run(&ctx, &seeds, ReachabilityOptions::default());
        let super_ctor = &snapshot[&id("org.apache.commons.compress.CompressException#<init>(String)")];
        assert!(super_ctor.iter().any(|r| matches!(
            r,
            InclusionReason::TransitiveCtorForSubclass { live: true, .. }
        )));
        assert!(!snapshot.contains_key(&id(
            "org.apache.commons.compress.CompressException#<init>(String,Throwable)"
        )));
        assert_chaining_closed(&ctx, &snapshot);
    }

    #[test]
    fn test_chain_through_implicit_default_constructor() {
        let ctx = build(&[
            (
                "c/Base.java",
                "package c;\nclass Base {\n  Base() { init(); }\n  Base(int x) { }\n  void init() { }\n}\n",
            ),
            ("c/Middle.java", "package c;\nclass Middle extends Base {\n}\n"),
            ("c/Leaf.java", "package c;\nclass Leaf extends Middle {\n  Leaf() { super(); }\n}\n"),
            ("c/Main.java", "package c;\nclass Main {\n  void test() { new Leaf(); }\n}\n"),
        ]);
        let snapshot = run(&ctx, &entry_seeds(&ctx, "c.Main#test"), ReachabilityOptions::default());

        let base_ctor = &snapshot[&id("c.Base#<init>()")];
        assert!(base_ctor.iter().any(InclusionReason::is_live));
        assert!(base_ctor
            .iter()
            .any(|r| matches!(r, InclusionReason::TransitiveCtorForSubclass { .. })));
        assert!(snapshot[&id("c.Base#init()")].iter().any(InclusionReason::is_live));
        assert!(!snapshot.contains_key(&id("c.Base#<init>(int)")));
        assert!(snapshot.contains_key(&id("c.Middle")));
    }
}

// ============================================================================
// Inclusion rules
// ============================================================================

mod rules {
    use super::*;

    #[test]
    fn test_nested_type_keeps_its_parent() {
        let ctx = build(&[
            (
                "n/Outer.java",
                "package n;\nclass Outer {\n  static class Inner {\n    static void go() { }\n  }\n  void unused() { }\n}\n",
            ),
            ("n/Main.java", "package n;\nclass Main {\n  void test() { Outer.Inner.go(); }\n}\n"),
        ]);
        let snapshot = run(&ctx, &entry_seeds(&ctx, "n.Main#test"), ReachabilityOptions::default());
        assert!(snapshot[&id("n.Outer")].contains(&InclusionReason::NestParent {
            nested: id("n.Outer$Inner")
        }));
        assert!(!snapshot.contains_key(&id("n.Outer#unused()")));
    }

    #[test]
    fn test_member_level_interfaces_need_a_reference() {
        let ctx = build(&[
            ("i/Marker.java", "package i;\ninterface Marker {\n}\n"),
            ("i/Base.java", "package i;\nclass Base {\n}\n"),
            ("i/Impl.java", "package i;\nclass Impl extends Base implements Marker {\n}\n"),
            ("i/Main.java", "package i;\nclass Main {\n  void test() { new Impl(); }\n}\n"),
        ]);
        let seeds = entry_seeds(&ctx, "i.Main#test");

        let member = run(&ctx, &seeds, ReachabilityOptions::default());
        assert!(member[&id("i.Base")].contains(&InclusionReason::Supertype { sub: id("i.Impl") }));
        assert!(!member.contains_key(&id("i.Marker")));

        let class = run(
            &ctx,
            &seeds,
            ReachabilityOptions {
                granularity: Granularity::Class,
                ..ReachabilityOptions::default()
            },
        );
        assert!(class[&id("i.Marker")].contains(&InclusionReason::Supertype { sub: id("i.Impl") }));
    }

    #[test]
    fn test_coverage_seeding_keeps_unexecuted_calls_structural() {
        let ctx = build(&[(
            "s/A.java",
            "package s;\nclass A {\n  void test() { ran(); skipped(); }\n  void ran() { }\n  void skipped() { }\n}\n",
        )]);
        let mut seeds = entry_seeds(&ctx, "s.A#test");
        seeds.push((id("s.A#ran()"), InclusionReason::CoverageExecuted));
        let snapshot = run(
            &ctx,
            &seeds,
            ReachabilityOptions {
                seeding: Seeding::Coverage,
                ..ReachabilityOptions::default()
            },
        );
        assert!(snapshot[&id("s.A#ran()")].iter().any(InclusionReason::is_live));
        let skipped = &snapshot[&id("s.A#skipped()")];
        assert!(!skipped.is_empty());
        assert!(!skipped.iter().any(InclusionReason::is_live));
    }

    #[test]
    fn test_annotation_arguments_are_live() {
        let ctx = build(&[
            (
                "q/Limits.java",
                "package q;\nclass Limits {\n  static final String NAME = \"n\";\n  static final String OTHER = \"o\";\n}\n",
            ),
            ("q/Tag.java", "package q;\n@interface Tag {\n  String value();\n}\n"),
            (
                "q/Main.java",
                "package q;\nclass Main {\n  @Tag(Limits.NAME)\n  void test() { }\n}\n",
            ),
        ]);
        let snapshot = run(&ctx, &entry_seeds(&ctx, "q.Main#test"), ReachabilityOptions::default());
        assert!(snapshot[&id("q.Limits#NAME")].iter().any(InclusionReason::is_live));
        assert!(!snapshot.contains_key(&id("q.Limits#OTHER")));
    }
}
