fn main() {
    pool_scenes_lib::run()
}
