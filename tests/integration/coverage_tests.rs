//! Coverage tests
//!
//! Reads the fixture's JaCoCo report and maps its records back onto the
//! commons-compress sources, plus the special cases of the matcher: implicit
//! constructors of anonymous classes, missing classes and ambiguous
//! overloads.

use std::path::{Path, PathBuf};

use testprune::config::Config;
use testprune::coverage::{
    parse_coverage_file, parse_coverage_files, ClassRecord, CoverageMatcher, CoverageParser, JacocoParser,
    MatchOutcome, MethodDescriptor, MethodRecord,
};
use testprune::discovery::FileFinder;
use testprune::graph::{DeclarationId, GraphBuilder, ParallelGraphBuilder, SourceContext};
use testprune::InclusionReason;

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

fn class(name: &str) -> ClassRecord {
    ClassRecord {
        name: name.to_string(),
        source_file: None,
        methods: Vec::new(),
    }
}

fn method(name: &str, descriptor: &str, line: Option<u32>) -> MethodRecord {
    MethodRecord {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        line,
        executed: true,
    }
}

// ============================================================================
// JaCoCo report
// ============================================================================

mod report {
    use super::*;

    #[test]
    fn test_fixture_report_structure() {
        let report = parse_coverage_file(&fixture_dir().join("jacoco.xml")).unwrap();
        assert_eq!(report.name, "commons-compress shortTextFilesAreNoTARs");
        assert_eq!(report.packages.len(), 7);
        assert_eq!(report.packages[1].name, "org.apache.commons.compress.archivers");

        let factory = report
            .find_class("org.apache.commons.compress.archivers.ArchiveStreamFactory")
            .unwrap();
        assert_eq!(factory.source_file.as_deref(), Some("ArchiveStreamFactory.java"));
        assert_eq!(factory.methods.len(), 7);
        let executed: Vec<&str> = factory
            .methods
            .iter()
            .filter(|m| m.executed)
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(
            executed,
            vec!["<clinit>", "<init>", "<init>", "detect", "createArchiveInputStream"]
        );
    }

    #[test]
    fn test_method_counter_decides_execution() {
        let report = parse_coverage_file(&fixture_dir().join("jacoco.xml")).unwrap();
        let compress = report
            .find_class("org.apache.commons.compress.CompressException")
            .unwrap();
        let executed: Vec<(&str, bool)> = compress
            .methods
            .iter()
            .map(|m| (m.descriptor.as_str(), m.executed))
            .collect();
        assert_eq!(
            executed,
            vec![
                ("()V", false),
                ("(Ljava/lang/String;)V", true),
                ("(Ljava/lang/String;Ljava/lang/Throwable;)V", false),
            ]
        );
        assert_eq!(report.executed_methods().count(), 22);
    }

    #[test]
    fn test_line_coverage() {
        let report = parse_coverage_file(&fixture_dir().join("jacoco.xml")).unwrap();
        let file = Path::new("org/apache/commons/compress/CompressException.java");
        assert_eq!(report.is_line_covered(file, 18), Some(true));
        assert_eq!(report.is_line_covered(file, 15), Some(false));
        assert_eq!(report.is_line_covered(file, 16), None);

        let on_disk = fixture_dir().join("src/main/java/org/apache/commons/compress/CompressException.java");
        assert_eq!(report.is_line_covered(&on_disk, 19), Some(true));
    }

    #[test]
    fn test_instruction_counter_fallback() {
        let xml = r#"<report name="r">
  <package name="p">
    <class name="p/A" sourcefilename="A.java">
      <method name="run" desc="()V" line="3">
        <counter type="INSTRUCTION" missed="0" covered="7"/>
      </method>
      <method name="idle" desc="()V" line="5">
        <counter type="INSTRUCTION" missed="2" covered="0"/>
      </method>
    </class>
  </package>
</report>"#;
        let report = JacocoParser::new().parse_xml(xml).unwrap();
        let a = report.find_class("p.A").unwrap();
        assert!(a.methods[0].executed);
        assert!(!a.methods[1].executed);
        assert_eq!(a.methods[0].line, Some(3));
    }

    #[test]
    fn test_merged_runs_union_execution() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = dir.path().join("first.xml");
        let second = dir.path().join("second.xml");
        std::fs::write(
            &first,
            r#"<report name="a"><package name="p"><class name="p/A"><method name="x" desc="()V"><counter type="METHOD" missed="0" covered="1"/></method><method name="y" desc="()V"><counter type="METHOD" missed="1" covered="0"/></method></class></package></report>"#,
        )
        .unwrap();
        std::fs::write(
            &second,
            r#"<report name="b"><package name="p"><class name="p/A"><method name="y" desc="()V"><counter type="METHOD" missed="0" covered="1"/></method></class></package></report>"#,
        )
        .unwrap();

        let merged = parse_coverage_files(&[first, second]).unwrap();
        assert_eq!(merged.executed_methods().count(), 2);
    }

    #[test]
    fn test_jacoco_parser_only_takes_xml() {
        let parser = JacocoParser::new();
        assert!(parser.can_parse(&fixture_dir().join("jacoco.xml")));
        assert!(!parser.can_parse(Path::new("coverage/lcov.info")));
        assert!(parse_coverage_file(Path::new("coverage/lcov.info")).is_err());
    }

    #[test]
    fn test_descriptor_shapes() {
        let desc = MethodDescriptor::parse("([BII[BII)Z").unwrap();
        assert_eq!(desc.arity(), 6);
        assert!(desc.params[0].is_reference());
        assert!(!desc.params[1].is_reference());
        assert!(MethodDescriptor::parse("(Ljava/lang/String").is_err());
    }
}

// ============================================================================
// Matching against the fixture
// ============================================================================

mod fixture_matching {
    use super::*;

    #[test]
    fn test_fixture_records_land_on_declarations() {
        let ctx = build_fixture();
        let matcher = CoverageMatcher::new(&ctx);
        let factory = class("org/apache/commons/compress/archivers/ArchiveStreamFactory");

        assert_eq!(
            matcher.match_method(&factory, &method("detect", "(Ljava/io/InputStream;)Ljava/lang/String;", Some(49))),
            Some(id("org.apache.commons.compress.archivers.ArchiveStreamFactory#detect(InputStream)"))
        );
        assert_eq!(
            matcher.match_method(
                &factory,
                &method(
                    "createArchiveInputStream",
                    "(Ljava/lang/String;Ljava/io/InputStream;)Lorg/apache/commons/compress/archivers/ArchiveInputStream;",
                    None
                )
            ),
            Some(id(
                "org.apache.commons.compress.archivers.ArchiveStreamFactory#createArchiveInputStream(String,InputStream)"
            ))
        );
        assert_eq!(
            matcher.match_method(&factory, &method("<init>", "(Ljava/lang/String;)V", None)),
            Some(id("org.apache.commons.compress.archivers.ArchiveStreamFactory#<init>(String)"))
        );
        // no static block: the class stands in for its initializer
        assert_eq!(
            matcher.match_method(&factory, &method("<clinit>", "()V", None)),
            Some(id("org.apache.commons.compress.archivers.ArchiveStreamFactory"))
        );
        assert_eq!(
            matcher.match_method(
                &class("org/apache/commons/compress/utils/ArchiveUtils"),
                &method("isEqual", "([BII[BII)Z", None)
            ),
            Some(id("org.apache.commons.compress.utils.ArchiveUtils#isEqual(byte[],int,int,byte[],int,int)"))
        );
    }

    #[test]
    fn test_implicit_constructor_matches_the_type() {
        let ctx = build_fixture();
        let matcher = CoverageMatcher::new(&ctx);
        assert_eq!(
            matcher.match_method(&class("org/apache/commons/compress/AbstractTest"), &method("<init>", "()V", None)),
            Some(id("org.apache.commons.compress.AbstractTest"))
        );
    }

    #[test]
    fn test_fixture_seeds() {
        let ctx = build_fixture();
        let report = parse_coverage_file(&fixture_dir().join("jacoco.xml")).unwrap();
        let seeds = CoverageMatcher::new(&ctx).seeds(&report);

        // the lambda is synthetic and JUnit's Assertions is not in the tree
        assert_eq!(seeds.seeds.len(), 20);
        assert_eq!(seeds.unmatched, 1);
        assert!(seeds.diagnostics.is_empty());
        assert!(seeds
            .seeds
            .iter()
            .all(|(_, reason)| *reason == InclusionReason::CoverageExecuted));
        assert!(seeds.seeds.iter().any(|(decl, _)| *decl
            == id("org.apache.commons.compress.archivers.ArchiveException#<init>(String)")));
        assert!(!seeds.seeds.iter().any(|(decl, _)| *decl
            == id("org.apache.commons.compress.archivers.ArchiveException#<init>(String,Exception)")));

        let mut sorted = seeds.seeds.clone();
        sorted.sort();
        assert_eq!(sorted, seeds.seeds);
    }
}

// ============================================================================
// Matcher special cases
// ============================================================================

mod special_cases {
    use super::*;

    fn listener_context() -> SourceContext {
        build(&[(
            "w/Widget.java",
            r#"package w;
public class Widget {
    private final String label;
    public Widget(String label) {
        this.label = label;
    }
    Runnable onClick() {
        return new Runnable() {
            public void run() {
                System.out.println(label);
            }
        };
    }
    void put(a.Key key) { }
    void put(b.Key key) { }
    void tag(Tag tag) { }
    void tag(Meta.Tag tag) { }
}
"#,
        )])
    }

    #[test]
    fn test_synthetic_anonymous_constructor() {
        let ctx = listener_context();
        let matcher = CoverageMatcher::new(&ctx);
        // javac passes the enclosing instance to the anonymous class
        assert_eq!(
            matcher.match_method(&class("w/Widget$1"), &method("<init>", "(Lw/Widget;)V", Some(8))),
            Some(id("w.Widget$1"))
        );
        assert_eq!(
            matcher.match_method(&class("w/Widget$1"), &method("run", "()V", Some(9))),
            Some(id("w.Widget$1#run()"))
        );
    }

    #[test]
    fn test_missing_class_yields_none() {
        let ctx = listener_context();
        let matcher = CoverageMatcher::new(&ctx);
        assert_eq!(matcher.match_method(&class("w/Widget$2"), &method("<init>", "()V", None)), None);
        assert_eq!(matcher.match_method(&class("w/Gadget"), &method("run", "()V", None)), None);
        assert_eq!(
            matcher.match_method_detailed(&class("w/Gadget"), &method("run", "()V", None)),
            MatchOutcome::MissingClass
        );
    }

    #[test]
    fn test_overloads_split_by_package() {
        let ctx = listener_context();
        let matcher = CoverageMatcher::new(&ctx);
        let widget = class("w/Widget");
        assert_eq!(
            matcher.match_method(&widget, &method("put", "(La/Key;)V", None)),
            Some(id("w.Widget#put(a.Key)"))
        );
        // the line of the other overload does not outvote the descriptor
        assert_eq!(
            matcher.match_method(&widget, &method("put", "(Lb/Key;)V", Some(14))),
            Some(id("w.Widget#put(b.Key)"))
        );
        assert_eq!(matcher.match_method(&widget, &method("put", "(Lc/Key;)V", None)), None);
        assert_eq!(matcher.match_method(&widget, &method("put", "(Lc/Key;)V", Some(15))), None);
    }

    #[test]
    fn test_ambiguous_overload_yields_none() {
        let ctx = listener_context();
        let matcher = CoverageMatcher::new(&ctx);
        let widget = class("w/Widget");
        // neither spelling says which package the tag comes from
        assert_eq!(matcher.match_method(&widget, &method("tag", "(Lx/Meta$Tag;)V", None)), None);
        assert!(matches!(
            matcher.match_method_detailed(&widget, &method("tag", "(Lx/Meta$Tag;)V", None)),
            MatchOutcome::Ambiguous(candidates) if candidates.len() == 2
        ));
        // a line inside exactly one candidate settles it
        assert_eq!(
            matcher.match_method(&widget, &method("tag", "(Lx/Meta$Tag;)V", Some(17))),
            Some(id("w.Widget#tag(Meta.Tag)"))
        );
        // only one of them can be a nested Tag
        assert_eq!(
            matcher.match_method(&widget, &method("tag", "(Lx/Tag;)V", None)),
            Some(id("w.Widget#tag(Tag)"))
        );
    }

    #[test]
    fn test_synthetic_methods_yield_none() {
        let ctx = listener_context();
        let matcher = CoverageMatcher::new(&ctx);
        let widget = class("w/Widget");
        for (name, desc) in [("lambda$onClick$0", "()V"), ("access$000", "(Lw/Widget;)Ljava/lang/String;")] {
            assert_eq!(
                matcher.match_method_detailed(&widget, &method(name, desc, None)),
                MatchOutcome::Synthetic,
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_explicit_constructor_by_shape() {
        let ctx = listener_context();
        let matcher = CoverageMatcher::new(&ctx);
        assert_eq!(
            matcher.match_method(&class("w/Widget"), &method("<init>", "(Ljava/lang/String;)V", None)),
            Some(id("w.Widget#<init>(String)"))
        );
        assert_eq!(
            matcher.match_method_detailed(&class("w/Widget"), &method("<init>", "(I)V", None)),
            MatchOutcome::NoCandidate
        );
    }
}
