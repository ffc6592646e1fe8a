fn main() {
    if handle_cli_flags() {
        return;
    }

    if let Err(err) = wall_tui::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut saw_flag = false;
    let mut idx = 0;
    while idx < args.len() {
        match args[idx].as_str() {
            "--version" | "-V" => {
                println!("TheWall {}", wall_tui::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "TheWall - post, like and comment on a shared wall from the terminal.\n\n  --version, -V              Show version and exit\n  --help,    -h              Show this help message\n  --feed                     Print the wall and exit\n  --set-backend URL KEY      Save backend URL and API key to the config file"
                );
                saw_flag = true;
            }
            "--feed" => {
                saw_flag = true;
                if let Err(err) = wall_tui::app::print_feed() {
                    eprintln!("error: {err:?}");
                    std::process::exit(1);
                }
            }
            "--set-backend" => {
                saw_flag = true;
                let (Some(url), Some(key)) = (args.get(idx + 1), args.get(idx + 2)) else {
                    eprintln!("usage: wall-tui --set-backend URL API_KEY");
                    std::process::exit(2);
                };
                match wall_tui::app::set_backend(url, key) {
                    Ok(path) => println!("Saved backend settings to {}", path.display()),
                    Err(err) => {
                        eprintln!("error: {err:?}");
                        std::process::exit(1);
                    }
                }
                idx += 2;
            }
            _ => {}
        }
        idx += 1;
    }
    saw_flag
}
