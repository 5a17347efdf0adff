fn main() -> anyhow::Result<()> {
    netscript::run()
}
