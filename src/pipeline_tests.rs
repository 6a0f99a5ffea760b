#[cfg(test)]
mod tests {
    use crate::context::{Arguments, UnitKind};
    use crate::error::{CompileError, ERR_IMPORT_FILE, ERR_TABLE_UNIQUE, ERR_UNIT_DUPLICATE};
    use crate::pipeline::{build, compile, CompileOptions};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, src: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, src).unwrap();
        path
    }

    fn options(tokens: &[&str]) -> CompileOptions {
        CompileOptions {
            arguments: Arguments::parse(tokens.iter().copied()),
            output: None,
        }
    }

    fn compile_text(entry: &Path, tokens: &[&str]) -> String {
        compile(entry, &options(tokens)).unwrap().text
    }

    fn syntax_code(err: CompileError) -> &'static str {
        match err {
            CompileError::Syntax(e) => e.code,
            other => panic!("expected a syntax error, got {}", other),
        }
    }

    #[test]
    fn test_function_with_hoisted_locals() {
        let dir = TempDir::new().unwrap();
        let main = write(
            &dir,
            "main.jp",
            "library Util:\n    Run():\n        a()\n        integer *d1 = 1\n        b()\n        real *d2\n        c()\n        unit *d3 = u\n",
        );
        let text = compile_text(&main, &[]);
        assert_eq!(
            text,
            "library Util\n\
             \x20   private function Run takes nothing returns nothing\n\
             \x20       local integer d1\n\
             \x20       local real d2\n\
             \x20       local unit d3\n\
             \x20       call a()\n\
             \x20       set d1 = 1\n\
             \x20       call b()\n\
             \x20       call c()\n\
             \x20       set d3 = u\n\
             \x20   endfunction\n\
             endlibrary\n"
        );
    }

    #[test]
    fn test_open_blocks_closed_in_reverse_order() {
        let dir = TempDir::new().unwrap();
        let main = write(
            &dir,
            "main.jp",
            "library A:\n    F():\n        loop:\n            if x:\n                loop:\n                    go()\n",
        );
        let text = compile_text(&main, &[]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            &lines[lines.len() - 5..],
            &[
                "                endloop",
                "            endif",
                "        endloop",
                "    endfunction",
                "endlibrary",
            ]
        );
        assert!(text.contains("            if x then\n"));
        assert!(text.contains("                    call go()\n"));
    }

    #[test]
    fn test_zero_argument_macro_expands_identically() {
        let dir = TempDir::new().unwrap();
        let main = write(
            &dir,
            "main.jp",
            "library A:\n    macro TICK():\n        n++\n    F():\n        TICK!()\n        TICK!()\n",
        );
        let text = compile_text(&main, &[]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "        set n = n + 1");
        assert_eq!(lines[2], lines[3]);
        assert!(!text.contains("macro"));
    }

    #[test]
    fn test_macro_defined_in_later_file() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.jp", "import shared\nlibrary A:\n    F():\n        shared.HELLO!(\"hi there\")\n");
        write(&dir, "shared.jpl", "macro HELLO(msg):\n    Print(\"$msg$\")\n");
        let text = compile_text(&main, &[]);
        assert!(text.contains("        call Print(\"hi there\")\n"));
    }

    #[test]
    fn test_interpolation_leaves_no_markers() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.jp", "library Log:\n    Show(integer hp):\n        string *s = f\"hp: {hp}\"\n");
        let text = compile_text(&main, &[]);
        assert!(text.contains("    private function Show takes integer hp returns nothing\n"));
        assert!(text.contains("        local string s = \"hp: \" + hp\n"));
        assert!(!text.contains("f\""));
    }

    #[test]
    fn test_interpolated_expressions_are_lowered() {
        let dir = TempDir::new().unwrap();
        let main = write(
            &dir,
            "main.jp",
            "library Log:\n    Show():\n        Print(f\"v={a && True}\")\n        ok = f\"{[DEBUG]_exists}\"\n        Print(\"f\", \"z\")\n",
        );
        let text = compile_text(&main, &["DEBUG"]);
        assert!(text.contains("        call Print(\"v=\" + (a and true))\n"));
        assert!(text.contains("        set ok = (true)\n"));
        assert!(text.contains("        call Print(\"f\", \"z\")\n"));
    }

    #[test]
    fn test_comment_only_file_is_a_single_newline() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.jp", "# nothing here\n\n\"\"\"\nblock comment\n\"\"\"\n   \n");
        assert_eq!(compile_text(&main, &[]), "\n");
    }

    #[test]
    fn test_aggregation_blocks_for_systems_and_data() {
        let dir = TempDir::new().unwrap();
        let main = write(
            &dir,
            "main.jp",
            "import Items\nimport util\n\nsystem Combat:\n    uses util\n    init:\n        Setup()\n",
        );
        write(&dir, "Items.csv", "i!,s?\nid,name\n1,a\n2,\n");
        write(&dir, "util.jpl", "Ping():\n    x = 1\n");

        let output = compile(&main, &options(&[])).unwrap();
        let lines: Vec<&str> = output.text.lines().collect();
        assert_eq!(
            &lines[..4],
            &[
                "library VJPLIBS requires util",
                "endlibrary",
                "library VJPDATA requires VJPLIBS, Items",
                "endlibrary",
            ]
        );
        assert_eq!(lines[4], "library Combat initializer onInit requires VJPLIBS, VJPDATA, util");
        assert!(lines[5].starts_with("    private function VJPI"));
        assert_eq!(lines[6], "        call Setup()");
        assert!(lines.contains(&"library Items initializer onInit requires VJPLIBS"));
        assert!(lines.contains(&"        call SaveStr(HT, 0, 1, \"a\")"));
        assert!(!output.text.contains("call SaveStr(HT, 1,"));
        assert!(output.text.contains("library util\n    private function Ping takes nothing returns nothing\n        set x = 1\n"));

        let kinds: Vec<UnitKind> = output.report.files.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![UnitKind::Source, UnitKind::Table, UnitKind::Library]);
        assert_eq!(output.report.data, vec!["Items"]);
        assert_eq!(output.report.line_count, lines.len());
    }

    #[test]
    fn test_table_uniqueness_error_names_spreadsheet_row() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.jp", "import Items\n");
        write(&dir, "Items.csv", "i!,s?\nid,name\n1,a\n2,\n1,b\n");
        match compile(&main, &options(&[])).unwrap_err() {
            CompileError::Syntax(e) => {
                assert_eq!(e.code, ERR_TABLE_UNIQUE);
                assert_eq!(e.line, Some(5));
                assert!(e.file.ends_with("Items.csv"));
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_pass_through_file_copied_verbatim() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.jp", "import raw\nlibrary A:\n    F():\n        Raw()\n");
        write(&dir, "raw.j", "function Raw takes nothing returns nothing\n    // keep: as is\nendfunction\n");
        let text = compile_text(&main, &[]);
        assert!(text.ends_with("function Raw takes nothing returns nothing\n    // keep: as is\nendfunction\n"));
        assert!(text.starts_with("library A\n"));
    }

    #[test]
    fn test_when_gated_import_and_argument_checks() {
        let dir = TempDir::new().unwrap();
        let main = write(
            &dir,
            "main.jp",
            "when DEBUG import dbg\nlibrary A:\n    F():\n        if [DEBUG]_exists:\n            x()\n",
        );
        write(&dir, "dbg.jpl", "Trace():\n    y()\n");

        let release = compile_text(&main, &[]);
        assert!(!release.contains("library dbg"));
        assert!(release.contains("        if false then\n"));

        let debug = compile_text(&main, &["DEBUG"]);
        assert!(debug.contains("library dbg\n"));
        assert!(debug.contains("        if true then\n"));
    }

    #[test]
    fn test_missing_import_and_duplicate_units() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.jp", "import nowhere\n");
        assert_eq!(syntax_code(compile(&main, &options(&[])).unwrap_err()), ERR_IMPORT_FILE);

        let dup = write(&dir, "dup.jp", "import A\nlibrary A:\n    F():\n        x()\n");
        write(&dir, "A.jpl", "G():\n    y()\n");
        assert_eq!(syntax_code(compile(&dup, &options(&[])).unwrap_err()), ERR_UNIT_DUPLICATE);

        let notes = write(&dir, "notes.txt", "");
        assert_eq!(syntax_code(compile(&notes, &options(&[])).unwrap_err()), ERR_IMPORT_FILE);
    }

    #[test]
    fn test_build_writes_beside_entry_or_to_override() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.jp", "library A:\n    integer MAX = 3\n");

        let output = build(&main, &options(&[])).unwrap();
        assert!(output.path.ends_with("main.j"));
        let written = fs::read_to_string(&output.path).unwrap();
        assert_eq!(
            written,
            "library A\n    globals\n        private constant integer MAX = 3\n    endglobals\nendlibrary\n"
        );

        let target = dir.path().join("out/custom.j");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        let custom = CompileOptions {
            output: Some(target.clone()),
            ..options(&[])
        };
        build(&main, &custom).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), written);
    }

    #[test]
    fn test_report_written_as_json() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.jp", "alias id = integer\nlibrary A:\n    id COUNT = 1\n");
        let output = compile(&main, &options(&[])).unwrap();
        assert!(output.text.contains("        private constant integer COUNT = 1\n"));

        let report_path = dir.path().join("report.json");
        output.report.write(&report_path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(json["libraries"][0], "A");
        assert_eq!(json["aliasCount"], 1);
        assert_eq!(json["files"][0]["kind"], "source");
    }
}
