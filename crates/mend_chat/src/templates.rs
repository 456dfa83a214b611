//! Starter file content by extension.

use std::path::Path;

/// Minimal starter content for a file, chosen by its extension.
pub fn starter_template(path: &str) -> Option<String> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main");

    let content = match ext.as_str() {
        "py" => "def main():\n    print(\"Hello, world!\")\n\n\nif __name__ == \"__main__\":\n    main()\n".to_string(),
        "js" => "function main() {\n  console.log(\"Hello, world!\");\n}\n\nmain();\n".to_string(),
        "ts" => "function main(): void {\n  console.log(\"Hello, world!\");\n}\n\nmain();\n".to_string(),
        "html" => format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n  <title>{}</title>\n</head>\n<body>\n  <h1>Hello, world!</h1>\n</body>\n</html>\n",
            stem
        ),
        "css" => "body {\n  margin: 0;\n  font-family: sans-serif;\n}\n".to_string(),
        "go" => "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"Hello, world!\")\n}\n".to_string(),
        "java" => format!(
            "public class {} {{\n    public static void main(String[] args) {{\n        System.out.println(\"Hello, world!\");\n    }}\n}}\n",
            stem
        ),
        "rs" => "fn main() {\n    println!(\"Hello, world!\");\n}\n".to_string(),
        "md" => format!("# {}\n", stem),
        "json" => "{}\n".to_string(),
        _ => return None,
    };

    Some(content)
}

/// First `name.ext` token in the text that has a starter template.
pub fn file_name_in(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | ',' | ';' | ':' | '(' | ')'))
                .trim_end_matches('.')
        })
        .find(|word| word.contains('.') && starter_template(word).is_some())
        .map(str::to_string)
}
