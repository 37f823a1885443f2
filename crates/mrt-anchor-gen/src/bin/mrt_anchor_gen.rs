fn main() -> anyhow::Result<()> {
    mrt_anchor_gen::cli::run()
}
