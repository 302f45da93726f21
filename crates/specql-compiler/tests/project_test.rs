use std::fs;
use std::path::Path;

use tempfile::TempDir;

use specql_compiler::diagnostic::ErrorKind;
use specql_compiler::{Compiler, CompilerConfig, RESULT_TYPE_FILE};

const COMPANY: &str = r#"
entity: Company
schema: crm
fields:
  name: text
actions:
  - name: create_company
    steps:
      - insert: Company
        fields:
          name: input.name
"#;

const CONTACT: &str = r#"
entity: Contact
schema: crm
fields:
  email: email
  status: text
  company: ref(Company)
actions:
  - name: qualify_lead
    requires: caller.can_edit_contact
    steps:
      - validate: status = 'lead'
        error: not_a_lead
      - update: Contact SET status = 'qualified' WHERE pk_contact = v_pk
  - name: touch
    steps:
      - update: Contact SET status = 'touched' WHERE pk_contact = v_pk
"#;

fn project(files: &[(&str, &str)]) -> (TempDir, CompilerConfig) {
    let dir = TempDir::new().unwrap();
    let domain = dir.path().join("entities");
    fs::create_dir_all(&domain).unwrap();
    for (name, content) in files {
        fs::write(domain.join(name), content).unwrap();
    }
    let config = CompilerConfig {
        domain_dir: domain,
        out_dir: dir.path().join("generated"),
        ..Default::default()
    };
    (dir, config)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_compile_project() {
    let (_dir, config) = project(&[("company.yaml", COMPANY), ("contact.yml", CONTACT)]);
    let out = config.out_dir.clone();

    let result = Compiler::new(config).compile().unwrap();
    assert_eq!(result.entities, 2);
    assert_eq!(result.functions, 3);
    assert_eq!(result.warnings.len(), 1);

    let types = read(&out.join(RESULT_TYPE_FILE));
    assert!(types.contains("CREATE TYPE app.mutation_result AS ("));

    let qualify = read(&out.join("crm").join("qualify_lead.sql"));
    assert!(qualify.starts_with("-- Action: Contact.qualify_lead\n-- Requires: caller.can_edit_contact\n"));
    assert!(qualify.contains("CREATE OR REPLACE FUNCTION crm.qualify_lead("));
    assert!(qualify.contains("    p_company_id UUID DEFAULT NULL,"));

    let create = read(&out.join("crm").join("create_company.sql"));
    assert!(create.contains("INSERT INTO crm.tb_company (name, created_by)"));
    assert!(create.contains("RETURNING pk_company INTO v_created_pk;"));

    assert!(out.join("crm").join("touch.sql").is_file());
}

#[test]
fn test_generation_is_deterministic() {
    let (_dir, config) = project(&[("company.yaml", COMPANY), ("contact.yaml", CONTACT)]);
    let compiler = Compiler::new(config);
    let domain = compiler.load().unwrap();

    let first = compiler.generate(&domain).unwrap();
    let second = compiler.generate(&domain).unwrap();
    assert_eq!(first.files, second.files);

    let names: Vec<String> = first
        .files
        .iter()
        .map(|(path, _)| path.to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(
        names,
        vec![
            RESULT_TYPE_FILE,
            "crm/create_company.sql",
            "crm/qualify_lead.sql",
            "crm/touch.sql",
        ]
    );
}

#[test]
fn test_first_error_stops_compilation() {
    let broken = r#"
entity: Lead
schema: sales
fields:
  status: text
actions:
  - name: promote
    steps:
      - teleport: somewhere
"#;
    let (_dir, config) = project(&[("company.yaml", COMPANY), ("lead.yaml", broken)]);
    let out = config.out_dir.clone();

    let err = Compiler::new(config).compile().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownStepKind);
    assert!(err.to_string().contains("Lead.promote"));
    assert!(!out.exists());
}

#[test]
fn test_check_reports_every_action() {
    let (_dir, config) = project(&[("contact.yaml", CONTACT)]);
    let reports = Compiler::new(config).check().unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].action, "qualify_lead");
    assert!(reports[0].report.is_valid());
    assert!(reports[0].report.warnings.is_empty());
    assert_eq!(reports[1].action, "touch");
    assert_eq!(reports[1].report.warnings.len(), 1);
}

#[test]
fn test_config_file_is_not_an_entity() {
    let (_dir, config) = project(&[
        ("company.yaml", COMPANY),
        ("specql.yaml", "soft_delete: true\n"),
    ]);
    let domain = Compiler::new(config).load().unwrap();
    assert_eq!(domain.entities.len(), 1);
}

#[test]
fn test_missing_domain_directory() {
    let dir = TempDir::new().unwrap();
    let config = CompilerConfig {
        domain_dir: dir.path().join("nowhere"),
        ..Default::default()
    };
    let err = Compiler::new(config).load().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}
