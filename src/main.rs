fn main() {
    let code = effect_codegen::run_cli(std::env::args().collect());
    std::process::exit(code);
}
