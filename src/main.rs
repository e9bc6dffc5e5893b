use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use grade_registry::utils::logging;
use grade_registry::{BatchContext, Config, GradeRegistryWriterService, MokaProgressStore};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    // 用法: grade_registry dir <班级目录> <作业目录>
    //       grade_registry class <班级目录>
    let args: Vec<String> = std::env::args().collect();
    let store = Arc::new(MokaProgressStore::new(Duration::from_secs(
        config.progress_ttl_secs,
    )));
    let service = GradeRegistryWriterService::new(config, store);
    let ctx = BatchContext {
        user: std::env::var("GRADE_USER").unwrap_or_else(|_| "local".to_string()),
        tenant: std::env::var("GRADE_TENANT").unwrap_or_else(|_| "default".to_string()),
        tracking_id: format!("cli-{}", chrono::Local::now().format("%Y%m%d%H%M%S")),
    };

    let outcome = match args.get(1).map(String::as_str) {
        Some("dir") if args.len() >= 4 => {
            service
                .process_assignment_directory(Path::new(&args[2]), Path::new(&args[3]), &ctx)
                .await
        }
        Some("class") if args.len() >= 3 => {
            service.process_class_directory(Path::new(&args[2]), &ctx).await
        }
        _ => bail!("用法: grade_registry dir <班级目录> <作业目录> | class <班级目录>"),
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
