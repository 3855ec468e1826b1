//! Source context tests
//!
//! Builds the bundled commons-compress fixture and small inline programs and
//! checks the declaration index, supertype links and override index.

use std::path::{Path, PathBuf};

use testprune::config::Config;
use testprune::discovery::FileFinder;
use testprune::graph::{
    DeclarationId, DeclarationKind, GraphBuilder, ParallelGraphBuilder, SourceContext, SuperRelation,
    TypeNesting, TypeTarget,
};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/compress")
}

fn fixture_config() -> Config {
    Config {
        source_roots: vec![PathBuf::from("src/main/java"), PathBuf::from("src/test/java")],
        ..Config::default()
    }
}

fn build_fixture() -> SourceContext {
    let config = fixture_config();
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

const ARCHIVERS: &str = "org.apache.commons.compress.archivers";

// ============================================================================
// Fixture
// ============================================================================

mod fixture {
    use super::*;

    #[test]
    fn test_fixture_parses_cleanly() {
        let ctx = build_fixture();
        assert_eq!(ctx.units().len(), 18);
        for unit in ctx.units() {
            assert_eq!(unit.syntax_errors, 0, "{} has syntax errors", unit.path.display());
            assert!(unit.package.is_some());
        }
    }

    #[test]
    fn test_fixture_declaration_ids() {
        let ctx = build_fixture();
        for key in [
            "org.apache.commons.compress.CompressException",
            "org.apache.commons.compress.archivers.ArchiveException",
            "org.apache.commons.compress.archivers.ArchiveException#<init>(String)",
            "org.apache.commons.compress.archivers.ArchiveException#<init>(String,Exception)",
            "org.apache.commons.compress.archivers.ArchiveException#serialVersionUID",
            "org.apache.commons.compress.archivers.ArchiveStreamFactory#detect(InputStream)",
            "org.apache.commons.compress.archivers.ArchiveStreamFactory#createArchiveInputStream(String,InputStream)",
            "org.apache.commons.compress.archivers.ar.ArArchiveInputStream#matches(byte[],int)",
            "org.apache.commons.compress.utils.ArchiveUtils#isEqual(byte[],int,int,byte[],int,int)",
            "org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#shortTextFilesAreNoTARs()",
        ] {
            assert!(ctx.contains(&id(key)), "missing {}", key);
        }
    }

    #[test]
    fn test_declaration_ids_are_sorted_and_unique() {
        let ctx = build_fixture();
        let ids = ctx.declaration_ids();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids.len(), sorted.len());
        assert_eq!(ids.len(), ctx.declarations().count());
    }

    #[test]
    fn test_imports_are_declarations() {
        let ctx = build_fixture();
        let factory = ctx
            .units()
            .iter()
            .find(|u| u.path.ends_with("archivers/ArchiveStreamFactory.java"))
            .unwrap();
        let targets: Vec<String> = factory
            .imports
            .iter()
            .map(|i| ctx.get(i).unwrap())
            .inspect(|d| assert_eq!(d.kind, DeclarationKind::Import))
            .map(|d| d.import.as_ref().unwrap().target.clone())
            .collect();
        assert!(targets.contains(&"java.util.Locale".to_string()));
        assert!(targets.contains(&"org.apache.commons.compress.utils.IOUtils".to_string()));
        assert!(factory.imports[0].as_str().starts_with("import:"));
    }

    #[test]
    fn test_supertype_links_follow_declaration_order() {
        let ctx = build_fixture();
        let tar_entry = id("org.apache.commons.compress.archivers.tar.TarArchiveEntry");
        let decl = ctx.get(&tar_entry).unwrap();
        let links = ctx.supertypes(&tar_entry);
        assert_eq!(links.len(), decl.super_types.len());
        for (link, written) in links.iter().zip(&decl.super_types) {
            assert_eq!(link.relation, written.relation);
        }
        assert_eq!(
            links[0].target,
            TypeTarget::Source(id("org.apache.commons.compress.archivers.ArchiveEntry"))
        );
        assert_eq!(
            links[1].target,
            TypeTarget::Source(id("org.apache.commons.compress.archivers.tar.TarConstants"))
        );
    }

    #[test]
    fn test_exception_hierarchy() {
        let ctx = build_fixture();
        let archive = id(&format!("{}.ArchiveException", ARCHIVERS));
        let compress = id("org.apache.commons.compress.CompressException");
        assert_eq!(ctx.superclass(&archive), Some(&TypeTarget::Source(compress.clone())));
        assert!(ctx.is_subtype_of(&archive, &compress));
        assert!(ctx.ancestors(&archive).contains(&compress));
        // java.io.IOException is outside the source tree
        assert!(ctx.has_external_ancestor(&compress));
        assert!(ctx.superclass(&compress).map(|t| t.is_opaque()).unwrap_or(false));
    }

    #[test]
    fn test_override_index_spans_interfaces() {
        let ctx = build_fixture();
        assert_eq!(
            ctx.overridden_bases(&id("org.apache.commons.compress.archivers.ar.ArArchiveEntry#getName()")),
            &[id("org.apache.commons.compress.archivers.ArchiveEntry#getName()")]
        );
        let next_entry = id(&format!("{}.ArchiveInputStream#getNextEntry()", ARCHIVERS));
        let overriders = ctx.overriders(&next_entry);
        assert!(overriders.contains(&id(
            "org.apache.commons.compress.archivers.ar.ArArchiveInputStream#getNextEntry()"
        )));
        assert!(overriders.contains(&id(
            "org.apache.commons.compress.archivers.tar.TarArchiveInputStream#getNextEntry()"
        )));
        // InputStream#read() lives in the JDK
        assert!(ctx.is_external_override(&id(&format!("{}.ArchiveInputStream#read()", ARCHIVERS))));
    }

    #[test]
    fn test_owner_of_members() {
        let ctx = build_fixture();
        let field = id(&format!("{}.ArchiveStreamFactory#DEFAULT", ARCHIVERS));
        let owner = ctx.owner_type(&field).unwrap();
        assert_eq!(owner.id, id(&format!("{}.ArchiveStreamFactory", ARCHIVERS)));
        assert_eq!(ctx.constructors(&owner.id).len(), 2);
    }
}

// ============================================================================
// Inline sources
// ============================================================================

mod inline {
    use super::*;

    #[test]
    fn test_nested_and_initializer_ids() {
        let ctx = build(&[(
            "p/Outer.java",
            r#"package p;
public class Outer {
    static int counter;
    static { counter = 1; }
    { counter++; }
    static class Nested {
        Nested(int x) {}
    }
    Runnable make() {
        return new Runnable() {
            public void run() {}
        };
    }
}
"#,
        )]);
        assert!(ctx.contains(&id("p.Outer#<clinit>#0")));
        assert!(ctx.contains(&id("p.Outer#<init-block>#0")));
        assert!(ctx.contains(&id("p.Outer$Nested#<init>(int)")));
        let anon = ctx.get(&id("p.Outer$1")).unwrap();
        assert_eq!(anon.nesting, Some(TypeNesting::Anonymous));
        assert_eq!(anon.parent, Some(id("p.Outer#make()")));
        assert_eq!(ctx.owner_type(&anon.id).map(|d| d.id.clone()), Some(id("p.Outer")));
        assert!(ctx.contains(&id("p.Outer$1#run()")));
    }

    #[test]
    fn test_grouped_fields_share_a_group() {
        let ctx = build(&[("p/F.java", "package p;\nclass F {\n    int a = 1, b, c = 3;\n}\n")]);
        let groups: Vec<_> = ["p.F#a", "p.F#b", "p.F#c"]
            .iter()
            .map(|k| ctx.get(&id(k)).unwrap().extent.field_group.unwrap())
            .collect();
        assert!(groups.iter().all(|g| g.span == groups[0].span && g.len == 3));
        assert_eq!(groups.iter().map(|g| g.index).collect::<Vec<_>>(), vec![0, 1, 2]);

        let a = ctx.get(&id("p.F#a")).unwrap();
        assert!(groups[0].span.encloses(&a.extent.full));
        assert!(a.extent.initializer.is_some());
        assert!(ctx.get(&id("p.F#b")).unwrap().extent.initializer.is_none());
    }

    #[test]
    fn test_interface_clause_extent() {
        let ctx = build(&[(
            "p/Impl.java",
            "package p;\ninterface A {}\ninterface B {}\nclass Impl extends Object implements A, B {}\n",
        )]);
        let decl = ctx.get(&id("p.Impl")).unwrap();
        let unit = ctx.unit_of(&decl.id).unwrap();
        let clause = decl.extent.interface_clause.unwrap();
        assert_eq!(&unit.source[clause.start..clause.end], "implements A, B");
        let relations: Vec<SuperRelation> = decl.super_types.iter().map(|s| s.relation).collect();
        assert_eq!(
            relations,
            vec![SuperRelation::Superclass, SuperRelation::Interface, SuperRelation::Interface]
        );
    }

    #[test]
    fn test_syntax_errors_are_diagnostics() {
        let ctx = build(&[("p/Broken.java", "package p;\nclass Broken {\n    void m( {\n}\n")]);
        let unit = ctx.unit(Path::new("p/Broken.java")).unwrap();
        assert!(unit.syntax_errors > 0);
        assert!(ctx.diagnostics().count() > 0);
    }
}
