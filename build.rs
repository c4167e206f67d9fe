use chrono::Utc;

fn main() {
    // 记录构建时间，/api/health 返回 / Build timestamp reported by /api/health
    let built = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    println!("cargo:rustc-env=KANAGEN_BUILT_AT={}", built);
    println!("cargo:rerun-if-changed=build.rs");
}
