//! CLI driver: `-e`/`-l`/`-i`/`-v`/`-E`/`--` option parsing, `LUA_INIT`/
//! `LUA_PATH` environment handling, and a REPL, grounded on the teacher's
//! `luars_interpreter` binary. This is the one place in the crate that owns
//! its own presentation concerns — everything else stays a library.

use lua51rt::value::LuaValue;
use lua51rt::vm::LuaVM;
use std::env;
use std::io::{self, BufRead, Read, Write};
use std::rc::Rc;

const VERSION: &str = "Lua 5.1 (lua-rt)";

fn print_usage() {
    eprintln!("usage: lua [options] [script [args]]");
    eprintln!("Available options are:");
    eprintln!("  -e stat   execute string 'stat'");
    eprintln!("  -i        enter interactive mode after executing 'script'");
    eprintln!("  -l mod    require library 'mod' into global 'mod'");
    eprintln!("  -v        show version information");
    eprintln!("  -E        ignore environment variables");
    eprintln!("  --        stop handling options");
    eprintln!("  -         stop handling options and execute stdin");
}

fn print_version() {
    println!("{}", VERSION);
}

#[derive(Default)]
struct Options {
    execute_strings: Vec<String>,
    interactive: bool,
    script_file: Option<String>,
    script_args: Vec<String>,
    require_modules: Vec<String>,
    show_version: bool,
    read_stdin: bool,
    ignore_env: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::default();
    let mut i = 1;
    let mut stop_options = false;

    while i < args.len() {
        let a = &args[i];
        if !stop_options && a.starts_with('-') && a.len() > 1 {
            match a.as_str() {
                "-e" => {
                    i += 1;
                    if i >= args.len() {
                        return Err("'-e' needs argument".to_string());
                    }
                    opts.execute_strings.push(args[i].clone());
                }
                "-i" => opts.interactive = true,
                "-l" => {
                    i += 1;
                    if i >= args.len() {
                        return Err("'-l' needs argument".to_string());
                    }
                    opts.require_modules.push(args[i].clone());
                }
                "-v" => opts.show_version = true,
                "-E" => opts.ignore_env = true,
                "--" => stop_options = true,
                "-" => {
                    opts.read_stdin = true;
                    stop_options = true;
                }
                other => return Err(format!("unrecognized option '{}'", other)),
            }
        } else {
            opts.script_file = Some(a.clone());
            i += 1;
            while i < args.len() {
                opts.script_args.push(args[i].clone());
                i += 1;
            }
            break;
        }
        i += 1;
    }
    Ok(opts)
}

fn setup_arg_table(vm: &mut LuaVM, exe_path: &str, script_name: Option<&str>, args: &[String]) {
    let t = match vm.new_table() {
        LuaValue::Table(id) => id,
        _ => unreachable!(),
    };
    if let Some(name) = script_name {
        let s = vm.new_string(name);
        vm.raw_set(t, LuaValue::integer(0), s);
    }
    let exe = vm.new_string(exe_path);
    vm.raw_set(t, LuaValue::integer(-1), exe);
    for (i, a) in args.iter().enumerate() {
        let s = vm.new_string(a);
        vm.raw_set(t, LuaValue::integer(i as i64 + 1), s);
    }
    vm.set_global("arg", LuaValue::Table(t));
}

fn require_module(vm: &mut LuaVM, module: &str) -> Result<(), String> {
    let code = format!("{} = require('{}')", module, module);
    vm.do_string(&code).map(|_| ()).map_err(|e| vm.describe_error(&e))
}

fn execute_file(vm: &mut LuaVM, filename: &str) -> Result<(), String> {
    let source = std::fs::read_to_string(filename).map_err(|e| format!("cannot open {}: {}", filename, e))?;
    let proto = vm
        .compile_named(&source, &format!("@{}", filename))
        .map_err(|e| vm.describe_error(&e))?;
    vm.call_main(Rc::new(proto)).map(|_| ()).map_err(|e| vm.describe_error(&e))
}

fn execute_stdin(vm: &mut LuaVM) -> Result<(), String> {
    let mut source = String::new();
    io::stdin().read_to_string(&mut source).map_err(|e| format!("error reading stdin: {}", e))?;
    vm.do_string(&source).map(|_| ()).map_err(|e| vm.describe_error(&e))
}

fn run_repl(vm: &mut LuaVM) {
    println!("{}", VERSION);
    println!("Type Ctrl+D to exit");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut pending = String::new();

    loop {
        print!("{}", if pending.is_empty() { "> " } else { ">> " });
        io::stdout().flush().ok();

        let line = match lines.next() {
            Some(Ok(l)) => l,
            _ => break,
        };
        if pending.is_empty() && matches!(line.trim(), "exit" | "quit") {
            break;
        }
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);

        let as_expr = format!("return {}", pending);
        let code = if vm.compile(&as_expr).is_ok() { as_expr } else { pending.clone() };

        match vm.do_string(&code) {
            Ok(results) => {
                if let Some(first) = results.into_iter().next() {
                    if !first.is_nil() {
                        println!("{}", first.to_display_string(&vm.heap));
                    }
                }
                pending.clear();
            }
            Err(e) => {
                let msg = vm.describe_error(&e);
                if msg.contains("<eof>") || msg.contains("expected") {
                    continue;
                }
                eprintln!("{}", msg);
                pending.clear();
            }
        }
    }
}

fn main() {
    let stack_size = 16 * 1024 * 1024;
    let handler = std::thread::Builder::new()
        .name("lua-main".into())
        .stack_size(stack_size)
        .spawn(lua_main)
        .expect("failed to spawn lua-main thread");

    match handler.join() {
        Ok(code) => std::process::exit(code),
        Err(_) => {
            eprintln!("lua: internal error (thread panicked)");
            std::process::exit(1);
        }
    }
}

fn lua_main() -> i32 {
    let opts = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("lua: {}", e);
            print_usage();
            return 1;
        }
    };

    if opts.show_version {
        print_version();
        if opts.execute_strings.is_empty() && opts.script_file.is_none() && !opts.read_stdin {
            return 0;
        }
    }

    let mut vm = LuaVM::new();
    vm.open_libs();

    if !opts.ignore_env {
        if let Ok(env_path) = env::var("LUA_PATH") {
            let escaped = env_path.replace('\\', "\\\\").replace('\'', "\\'");
            let _ = vm.do_string(&format!("package.path = '{}'", escaped));
        }
        if let Ok(init) = env::var("LUA_INIT") {
            let result = if let Some(filename) = init.strip_prefix('@') {
                execute_file(&mut vm, filename)
            } else {
                vm.do_string(&init).map(|_| ()).map_err(|e| vm.describe_error(&e))
            };
            if let Err(e) = result {
                eprintln!("lua: {}", e);
                return 1;
            }
        }
    }

    let exe_path = env::args().next().unwrap_or_else(|| "lua".to_string());
    setup_arg_table(&mut vm, &exe_path, opts.script_file.as_deref(), &opts.script_args);

    for module in &opts.require_modules {
        if let Err(e) = require_module(&mut vm, module) {
            eprintln!("lua: {}", e);
            return 1;
        }
    }

    for code in &opts.execute_strings {
        if let Err(e) = vm.do_string(code).map(|_| ()).map_err(|e| vm.describe_error(&e)) {
            eprintln!("lua: {}", e);
            return 1;
        }
    }

    if let Some(filename) = &opts.script_file {
        if let Err(e) = execute_file(&mut vm, filename) {
            eprintln!("lua: {}", e);
            return 1;
        }
    } else if opts.read_stdin {
        if let Err(e) = execute_stdin(&mut vm) {
            eprintln!("lua: {}", e);
            return 1;
        }
    }

    if opts.interactive || (opts.execute_strings.is_empty() && opts.script_file.is_none() && !opts.read_stdin) {
        run_repl(&mut vm);
    }

    0
}
