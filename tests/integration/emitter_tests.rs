//! Emitter tests
//!
//! Rewrites the commons-compress fixture and small inline programs, then
//! checks the output re-parses, keeps its import section consistent and
//! lands under the right output roots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use testprune::analysis::{EntrypointSpec, TransformDecision};
use testprune::config::Config;
use testprune::coverage::parse_coverage_file;
use testprune::discovery::FileFinder;
use testprune::graph::{ByteRange, DeclarationId, GraphBuilder, ParallelGraphBuilder, SourceContext};
use testprune::parser::JavaParser;
use testprune::reducer::{Reducer, ReducerKind, ReducerOptions, Reduction};
use testprune::refactor::{EditError, EmitError, EmittedUnit, Emitter, OutputLayout, SourceEditor, STUB_THROW};

const ENTRY: &str = "org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#shortTextFilesAreNoTARs";

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

fn options(kind: ReducerKind) -> ReducerOptions {
    ReducerOptions {
        granularity: kind.granularity(),
        seeding: kind.seeding(),
        ..ReducerOptions::default()
    }
}

fn reduce_static(ctx: &SourceContext, entry: &str) -> Reduction {
    Reducer::new(ctx, options(ReducerKind::MemberStatic))
        .reduce(&EntrypointSpec::parse(entry).unwrap(), None)
        .unwrap()
}

/// Emit the single unit of `ctx` with the given decisions; everything
/// else is kept
fn emit(ctx: &SourceContext, decisions: &[(&str, TransformDecision)]) -> EmittedUnit {
    let map: HashMap<DeclarationId, TransformDecision> = decisions
        .iter()
        .map(|(id, d)| (DeclarationId::new(*id), *d))
        .collect();
    Emitter::new(ctx)
        .emit_unit(&ctx.units()[0], |id| map.get(id).copied().unwrap_or(TransformDecision::NoOp))
        .unwrap()
}

fn contents<'r>(reduction: &'r Reduction, path: &str) -> &'r str {
    &reduction.unit(Path::new(path)).unwrap().contents
}

const IMPORTS_PROJECT: [(&str, &str); 4] = [
    (
        "src/a/A.java",
        "package a;\n\nimport b.Used;\nimport b.Unused;\nimport java.util.List;\nimport java.util.ArrayList;\n\npublic class A {\n    void entry() {\n        List<String> names = new ArrayList<>();\n        Used.go(names);\n    }\n\n    void idle() {\n        new Unused();\n    }\n}\n",
    ),
    (
        "src/b/Used.java",
        "package b;\n\nimport java.util.List;\n\npublic class Used {\n    public static void go(List<String> names) {\n        names.add(\"x\");\n    }\n\n    public static void never() {\n    }\n}\n",
    ),
    ("src/b/Unused.java", "package b;\n\npublic class Unused {\n}\n"),
    ("src/b/Other.java", "package b;\n\nimport b.Unused;\n\nclass Other {\n    Unused field;\n}\n"),
];

// ============================================================================
// Fixture output
// ============================================================================

mod fixture_output {
    use super::*;

    #[test]
    fn test_every_kind_reparses_cleanly() {
        let ctx = build_fixture();
        let coverage = parse_coverage_file(&fixture_dir().join("jacoco.xml")).unwrap();
        let parser = JavaParser::new();
        for kind in [
            ReducerKind::ClassStatic,
            ReducerKind::MemberStatic,
            ReducerKind::ClassCoverage,
            ReducerKind::MemberCoverage,
        ] {
            let reduction = Reducer::new(&ctx, options(kind))
                .reduce(&EntrypointSpec::parse(ENTRY).unwrap(), Some(&coverage))
                .unwrap();
            assert_eq!(reduction.units.len(), ctx.units().len());
            for unit in reduction.units.iter().filter(|u| !u.empty) {
                let errors = parser.count_syntax_errors(&unit.contents).unwrap();
                assert_eq!(errors, 0, "{} ({}) does not parse", unit.source_path.display(), kind);
            }
        }
    }

    #[test]
    fn test_entry_unit_survives() {
        let ctx = build_fixture();
        let reduction = reduce_static(&ctx, ENTRY);
        let test_unit = reduction
            .units
            .iter()
            .find(|u| u.source_path.ends_with("archivers/ArchiveStreamFactoryTest.java"))
            .unwrap();
        assert!(!test_unit.empty);
        assert!(test_unit.contents.contains("void shortTextFilesAreNoTARs()"));
        // the other tests in the class are not needed
        assert!(!test_unit.contents.contains("unknownArchiverName"));

        let unused = reduction
            .units
            .iter()
            .find(|u| u.source_path.ends_with("compressors/CompressorException.java"))
            .unwrap();
        assert!(unused.empty);
    }

    #[test]
    fn test_counts_match_decisions() {
        let ctx = build_fixture();
        let reduction = reduce_static(&ctx, ENTRY);
        let stubbed: usize = reduction.units.iter().map(|u| u.stubbed).sum();
        assert_eq!(stubbed, reduction.with_decision(TransformDecision::Stub).count());
        assert_eq!(reduction.stats.empty_units, reduction.units.iter().filter(|u| u.empty).count());
    }
}

// ============================================================================
// Imports
// ============================================================================

mod imports {
    use super::*;

    #[test]
    fn test_unused_imports_are_dropped() {
        let ctx = build(&IMPORTS_PROJECT);
        let reduction = reduce_static(&ctx, "a.A#entry");
        let a = contents(&reduction, "src/a/A.java");
        assert!(a.contains("import b.Used;\n"));
        assert!(a.contains("import java.util.List;\n"));
        assert!(a.contains("import java.util.ArrayList;\n"));
        assert!(!a.contains("import b.Unused;"));
        assert!(!a.contains("idle()"));

        assert!(reduction.unit(Path::new("src/b/Unused.java")).unwrap().empty);
        assert!(reduction.unit(Path::new("src/b/Other.java")).unwrap().empty);
        let used = contents(&reduction, "src/b/Used.java");
        assert!(used.contains("import java.util.List;"));
        assert!(!used.contains("never()"));
    }

    #[test]
    fn test_reduction_is_a_fixed_point() {
        let ctx = build(&IMPORTS_PROJECT);
        let first = reduce_static(&ctx, "a.A#entry");

        let survivors: Vec<(String, String)> = first
            .units
            .iter()
            .filter(|u| !u.empty)
            .map(|u| (u.source_path.to_string_lossy().into_owned(), u.contents.clone()))
            .collect();
        let borrowed: Vec<(&str, &str)> = survivors.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
        let rebuilt = build(&borrowed);
        for unit in rebuilt.units() {
            assert_eq!(unit.syntax_errors, 0, "{}", unit.path.display());
        }

        let second = reduce_static(&rebuilt, "a.A#entry");
        for (path, text) in &survivors {
            let again = second.unit(Path::new(path)).unwrap();
            assert!(!again.empty, "{} vanished on the second pass", path);
            assert_eq!(&again.contents, text, "{} changed on the second pass", path);
        }
        assert_eq!(second.stats.removed, 0);
    }
}

// ============================================================================
// Rewrites
// ============================================================================

mod rewrites {
    use super::*;

    #[test]
    fn test_stub_bodies() {
        let ctx = build(&[(
            "p/Child.java",
            "package p;\n\nclass Child extends Base {\n    Child(int size) {\n        super(size);\n        prepare();\n    }\n\n    String name() {\n        return \"child\";\n    }\n\n    void prepare() {\n    }\n}\n",
        )]);
        let out = emit(
            &ctx,
            &[
                ("p.Child#<init>(int)", TransformDecision::Stub),
                ("p.Child#name()", TransformDecision::Stub),
                ("p.Child#prepare()", TransformDecision::Remove),
            ],
        );
        assert!(out
            .contents
            .contains(&format!("Child(int size) {{ super(size); {} }}", STUB_THROW)));
        assert!(out.contents.contains(&format!("String name() {{ {} }}", STUB_THROW)));
        assert!(!out.contents.contains("prepare"));
        assert_eq!((out.stubbed, out.removed), (2, 1));
        assert_eq!(JavaParser::new().count_syntax_errors(&out.contents).unwrap(), 0);
    }

    #[test]
    fn test_interface_clause_is_trimmed() {
        let ctx = build(&[(
            "p/Impl.java",
            "package p;\n\nclass Impl extends Thread implements Gone, Kept {\n}\n\ninterface Gone {\n}\n\ninterface Kept {\n}\n",
        )]);
        let out = emit(&ctx, &[("p.Gone", TransformDecision::Remove)]);
        assert!(out.contents.contains("class Impl extends Thread implements Kept {"));
        assert!(!out.contents.contains("interface Gone"));

        let out = emit(
            &ctx,
            &[("p.Gone", TransformDecision::Remove), ("p.Kept", TransformDecision::Remove)],
        );
        assert!(out.contents.contains("class Impl extends Thread {"));
    }

    #[test]
    fn test_partial_field_group() {
        let ctx = build(&[(
            "p/Limits.java",
            "package p;\n\nclass Limits {\n    static final int LOW = 1, MID = 5, HIGH = 9;\n}\n",
        )]);
        let out = emit(
            &ctx,
            &[
                ("p.Limits#LOW", TransformDecision::Remove),
                ("p.Limits#HIGH", TransformDecision::Stub),
            ],
        );
        assert!(out.contents.contains("static final int MID = 5, HIGH = 0;"));
        assert!(!out.contents.contains("LOW"));
    }

    #[test]
    fn test_removed_nested_type_swallows_its_members() {
        let ctx = build(&[(
            "p/Outer.java",
            "package p;\n\nclass Outer {\n    static class Inner {\n        int value;\n\n        void a() {\n        }\n    }\n\n    void keep() {\n    }\n}\n",
        )]);
        let out = emit(
            &ctx,
            &[
                ("p.Outer$Inner", TransformDecision::Remove),
                ("p.Outer$Inner#value", TransformDecision::Remove),
                ("p.Outer$Inner#a()", TransformDecision::Remove),
            ],
        );
        assert_eq!(out.contents, "package p;\n\nclass Outer {\n\n    void keep() {\n    }\n}\n");
        assert_eq!(out.removed, 3);
    }

    #[test]
    fn test_crossing_edits_are_rejected() {
        let owner = DeclarationId::new("p.A#m()");
        let mut editor = SourceEditor::new("abcdefgh");
        editor.remove(&owner, ByteRange::new(0, 4));
        editor.remove(&owner, ByteRange::new(2, 6));
        assert!(matches!(editor.apply(), Err(EditError::Overlap { .. })));

        let mut editor = SourceEditor::new("abcdefgh");
        editor.remove(&owner, ByteRange::new(0, 6));
        editor.replace(&owner, ByteRange::new(2, 4), "zz");
        assert_eq!(editor.apply().unwrap(), "gh");

        let mut editor = SourceEditor::new("abc");
        editor.remove(&owner, ByteRange::new(1, 9));
        assert!(matches!(editor.apply(), Err(EditError::InvalidRange { .. })));
    }
}

// ============================================================================
// Writing
// ============================================================================

mod writing {
    use super::*;

    #[test]
    fn test_write_under_layout() {
        let ctx = build(&IMPORTS_PROJECT);
        let reduction = reduce_static(&ctx, "a.A#entry");
        let out = tempfile::tempdir().unwrap();
        let written = reduction.write(&OutputLayout::single("src", out.path())).unwrap();

        assert_eq!(written.len(), 2);
        assert!(out.path().join("a/A.java").exists());
        assert!(out.path().join("b/Used.java").exists());
        assert!(!out.path().join("b/Unused.java").exists());
        assert!(!out.path().join("b/Other.java").exists());

        let text = std::fs::read_to_string(out.path().join("a/A.java")).unwrap();
        assert_eq!(text, contents(&reduction, "src/a/A.java"));
    }

    #[test]
    fn test_unmapped_unit_is_an_error() {
        let ctx = build(&IMPORTS_PROJECT);
        let reduction = reduce_static(&ctx, "a.A#entry");
        let out = tempfile::tempdir().unwrap();
        let unit = reduction.unit(Path::new("src/a/A.java")).unwrap();
        let err = unit
            .write(&OutputLayout::single("elsewhere", out.path()))
            .unwrap_err();
        assert!(matches!(err, EmitError::Unmapped { .. }));
    }
}
