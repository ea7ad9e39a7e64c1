use clap::{Parser, Subcommand};
use glint_codegen::filters::builtin_filters;
use glint_codegen::{
    DefaultResolver, Environment, Library, NameResolver, Procedure, SnakeCaseResolver,
};
use glint_lexer::{CompileError, Scanner};
use glint_parser::ast::TemplateKind;
use serde_json::Value;
use std::fmt::Display;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "glint")]
#[command(about = "Glint: an HTML template language compiler")]
#[command(version)]
struct Cli {
    /// Print stage summaries to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a .glint file for errors without generating output
    Check {
        /// Input .glint file
        path: String,
        /// Compile as a layout regardless of the header
        #[arg(long)]
        layout: bool,
    },

    /// Compile a .glint file to a JavaScript render function
    Build {
        /// Input .glint file
        path: String,
        #[arg(long)]
        layout: bool,
        /// Output file (defaults to <stem>.js next to the input)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Read data fields from snake_case keys
        #[arg(long)]
        snake_case: bool,
    },

    /// Render a .glint file to HTML on stdout
    Render {
        /// Input .glint file
        path: String,
        /// JSON file with the data context
        #[arg(long)]
        data: Option<PathBuf>,
        /// Compile as a layout regardless of the header (single-file renders only)
        #[arg(long, conflicts_with = "lib")]
        layout: bool,
        #[arg(long)]
        snake_case: bool,
        /// Render only this fragment
        #[arg(long)]
        fragment: Option<String>,
        /// Directory of .glint templates available to include, widget and @extends
        #[arg(long)]
        lib: Option<PathBuf>,
    },
}

/// Compiler settings shared by the subcommands.
struct Options {
    layout: bool,
    snake_case: bool,
    verbose: bool,
}

impl Options {
    fn resolver(&self) -> &'static dyn NameResolver {
        if self.snake_case {
            &SnakeCaseResolver
        } else {
            &DefaultResolver
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    match cli.command {
        Command::Check { path, layout } => {
            let options = Options {
                layout,
                snake_case: false,
                verbose,
            };
            cmd_check(&path, &options)
        }
        Command::Build {
            path,
            layout,
            out,
            snake_case,
        } => {
            let options = Options {
                layout,
                snake_case,
                verbose,
            };
            cmd_build(&path, out, &options)
        }
        Command::Render {
            path,
            data,
            layout,
            snake_case,
            fragment,
            lib,
        } => {
            let options = Options {
                layout,
                snake_case,
                verbose,
            };
            cmd_render(&path, data, fragment.as_deref(), lib, &options)
        }
    }
}

fn read_source(path: &Path) -> String {
    if !path.exists() {
        fail("Error", format!("file not found: {}", path.display()));
    }
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => fail("Error", format!("reading {}: {e}", path.display())),
    }
}

fn fail(kind: &str, err: impl Display) -> ! {
    eprintln!("{kind}: {err}");
    std::process::exit(1);
}

fn fail_compile(err: &CompileError, source: &str) -> ! {
    eprintln!("Parse error: {err}");
    eprint!("{}", err.pointer(source));
    std::process::exit(1);
}

fn stem(path: &Path) -> &str {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template")
}

/// Run the full pipeline on one file, reporting and exiting on failure.
fn compile_file(path: &str, source: &str, options: &Options) -> Procedure {
    let tokens = Scanner::tokenize(source, path).unwrap_or_else(|e| fail_compile(&e, source));
    if options.verbose {
        eprintln!("Tokens: {}", tokens.len());
    }

    let mut parser = glint_parser::parser::Parser::new(tokens, path);
    if options.layout {
        parser = parser.with_kind(TemplateKind::Layout);
    }
    let template = parser
        .parse_template()
        .unwrap_or_else(|e| fail_compile(&e, source));
    if options.verbose {
        eprintln!("Kind: {:?}", template.kind);
        eprintln!("Nodes: {}", template.body.node_count());
    }

    let procedure = glint_codegen::generate(&template, options.resolver())
        .unwrap_or_else(|e| fail("Codegen error", e));
    procedure
        .link(builtin_filters())
        .unwrap_or_else(|e| fail("Codegen error", e));
    if options.verbose {
        if !procedure.fragments().is_empty() {
            eprintln!("Fragments: {}", procedure.fragments().join(", "));
        }
        let filters = procedure.filters_used();
        if !filters.is_empty() {
            eprintln!("Filters: {}", filters.join(", "));
        }
    }
    procedure
}

fn cmd_check(path: &str, options: &Options) {
    let source = read_source(Path::new(path));
    compile_file(path, &source, options);
    eprintln!("OK: {path}");
}

fn cmd_build(path: &str, out: Option<PathBuf>, options: &Options) {
    let source = read_source(Path::new(path));
    let procedure = compile_file(path, &source, options);

    let out_path = out.unwrap_or_else(|| {
        let input = Path::new(path);
        let dir = input.parent().unwrap_or(Path::new("."));
        dir.join(format!("{}.js", stem(input)))
    });
    if let Err(e) = std::fs::write(&out_path, procedure.emit()) {
        fail("Error", format!("writing {}: {e}", out_path.display()));
    }

    eprintln!("Built: {}", out_path.display());
}

fn cmd_render(
    path: &str,
    data: Option<PathBuf>,
    fragment: Option<&str>,
    lib: Option<PathBuf>,
    options: &Options,
) {
    let data = match data {
        Some(file) => serde_json::from_str::<Value>(&read_source(&file))
            .unwrap_or_else(|e| fail("Data error", format!("{}: {e}", file.display()))),
        None => Value::Object(Default::default()),
    };

    let source = read_source(Path::new(path));
    let html = match lib {
        Some(dir) => render_with_library(path, &source, &dir, fragment, &data, options),
        None => {
            let procedure = compile_file(path, &source, options);
            let env = Environment::new();
            let result = match fragment {
                Some(name) => procedure.render_fragment(name, &data, &env),
                None => procedure.render(&data, &env),
            };
            result.unwrap_or_else(|e| fail("Render error", e))
        }
    };
    print!("{html}");
}

/// Load every `*.glint` file of `dir` plus the input itself, then render the
/// input by name so includes, widgets and layouts resolve against the set.
fn render_with_library(
    path: &str,
    source: &str,
    dir: &Path,
    fragment: Option<&str>,
    data: &Value,
    options: &Options,
) -> String {
    let mut library = if options.snake_case {
        Library::new().with_resolver(SnakeCaseResolver)
    } else {
        Library::new()
    };

    let entries = std::fs::read_dir(dir)
        .unwrap_or_else(|e| fail("Error", format!("reading {}: {e}", dir.display())));
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "glint"))
        .collect();
    files.sort();

    for file in &files {
        let text = read_source(file);
        add_template(&mut library, stem(file), &text);
    }
    let name = stem(Path::new(path));
    add_template(&mut library, name, source);
    if options.verbose {
        eprintln!("Templates: {}", library.names().join(", "));
    }

    let result = match fragment {
        Some(fragment) => library.render_fragment(name, fragment, data),
        None => library.render(name, data),
    };
    result.unwrap_or_else(|e| fail("Render error", e))
}

fn add_template(library: &mut Library, name: &str, source: &str) {
    match library.add(name, source) {
        Ok(()) => {}
        Err(glint_codegen::Error::Compile(e)) => fail_compile(&e, source),
        Err(e) => fail("Codegen error", e),
    }
}
