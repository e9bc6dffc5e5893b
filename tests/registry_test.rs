//! 登记册管理器集成测试：锁、幂等写入、备份回滚、表头定位

use std::path::Path;

use grade_registry::error::{AppError, RegistryError};
use grade_registry::RegistryManager;

/// 构造一个测试登记册：指定表头位置和学生名单
fn make_registry(path: &Path, header_row: u32, name_col: u32, students: &[&str]) {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.get_cell_mut((name_col, header_row)).set_value("姓名");
    for (i, student) in students.iter().enumerate() {
        sheet
            .get_cell_mut((name_col, header_row + 1 + i as u32))
            .set_value(*student);
    }
    umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
}

#[test]
fn test_header_detection_beyond_row_one() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.xlsx");
    // 表头不在第 1 行：第 3 行第 2 列
    make_registry(&registry, 3, 2, &["张三", "李四"]);

    let mut manager = RegistryManager::new(&registry, 20);
    manager.load().unwrap();
    manager.validate_format().unwrap();

    assert_eq!(manager.header_row(), 3);
    assert_eq!(manager.name_column(), 2);
    assert_eq!(manager.find_row("张三"), Some(4));
    assert_eq!(manager.find_row("李四"), Some(5));
    assert_eq!(manager.roster(), ["张三", "李四"]);
    manager.release();
}

#[test]
fn test_duplicate_student_names_refuse_row_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.xlsx");
    // 两个张三占两行，李四唯一
    make_registry(&registry, 1, 1, &["张三", "张三", "李四"]);

    let mut manager = RegistryManager::new(&registry, 20);
    manager.load().unwrap();
    manager.validate_format().unwrap();

    // 同名学生绝不落到其中某一行
    assert_eq!(manager.find_row("张三"), None);
    // 名单原样保留两行，唯一姓名照常定位
    assert_eq!(manager.roster(), ["张三", "张三", "李四"]);
    assert_eq!(manager.find_row("李四"), Some(4));
    manager.release();
}

#[test]
fn test_missing_name_column() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.xlsx");
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.get_cell_mut((1, 1)).set_value("学号");
    umya_spreadsheet::writer::xlsx::write(&book, &registry).unwrap();

    let mut manager = RegistryManager::new(&registry, 20);
    manager.load().unwrap();
    let err = manager.validate_format().unwrap_err();
    assert!(matches!(
        err,
        AppError::Registry(RegistryError::MissingNameColumn { .. })
    ));
    manager.release();
}

#[test]
fn test_registry_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = RegistryManager::new(&dir.path().join("missing.xlsx"), 20);
    let err = manager.load().unwrap_err();
    assert!(matches!(
        err,
        AppError::Registry(RegistryError::NotFound { .. })
    ));
}

#[test]
fn test_lock_exclusivity() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.xlsx");
    make_registry(&registry, 1, 1, &["张三"]);

    let mut first = RegistryManager::new(&registry, 20);
    first.load().unwrap();

    // 第二个持有者立即失败，不阻塞
    let mut second = RegistryManager::new(&registry, 20);
    let err = second.load().unwrap_err();
    assert!(matches!(
        err,
        AppError::Registry(RegistryError::LockUnavailable { .. })
    ));

    // 第一个释放之后才能再加锁
    first.release();
    let mut third = RegistryManager::new(&registry, 20);
    third.load().unwrap();
    third.release();
}

#[test]
fn test_write_grade_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.xlsx");
    make_registry(&registry, 1, 1, &["张三"]);

    let mut manager = RegistryManager::new(&registry, 20);
    manager.load().unwrap();
    manager.validate_format().unwrap();
    manager.create_backup().unwrap();
    let column = manager.find_or_create_assignment_column(3).unwrap();
    assert_eq!(column, 4);

    let row = manager.find_row("张三").unwrap();
    let first = manager.write_grade(row, column, "A").unwrap();
    assert!(first.written);
    assert_eq!(first.old_value, None);

    // 第二次写同一个值：不发生写入，返回旧值
    let second = manager.write_grade(row, column, "A").unwrap();
    assert!(!second.written);
    assert_eq!(second.old_value.as_deref(), Some("A"));

    // 覆盖为不同值时返回被覆盖的旧值
    let third = manager.write_grade(row, column, "B").unwrap();
    assert!(third.written);
    assert_eq!(third.old_value.as_deref(), Some("A"));

    manager.save().unwrap();
}

#[test]
fn test_write_without_backup_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.xlsx");
    make_registry(&registry, 1, 1, &["张三"]);

    let mut manager = RegistryManager::new(&registry, 20);
    manager.load().unwrap();
    manager.validate_format().unwrap();
    let column = manager.find_or_create_assignment_column(1).unwrap();
    let row = manager.find_row("张三").unwrap();

    let err = manager.write_grade(row, column, "A").unwrap_err();
    assert!(matches!(
        err,
        AppError::Registry(RegistryError::InvalidState { .. })
    ));
    manager.release();
}

#[test]
fn test_rollback_restores_pre_batch_state() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.xlsx");
    make_registry(&registry, 1, 1, &["张三", "李四"]);
    let original = std::fs::read(&registry).unwrap();

    let mut manager = RegistryManager::new(&registry, 20);
    manager.load().unwrap();
    manager.validate_format().unwrap();
    manager.create_backup().unwrap();
    let column = manager.find_or_create_assignment_column(2).unwrap();
    let row = manager.find_row("李四").unwrap();
    manager.write_grade(row, column, "优秀").unwrap();

    // 中途失败：恢复备份，磁盘状态与批处理开始前完全一致
    manager.restore_from_backup().unwrap();
    assert_eq!(std::fs::read(&registry).unwrap(), original);

    // 备份文件已清理
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().contains(".backup."))
        .collect();
    assert!(leftovers.is_empty());

    // 锁已释放，可以重新加载
    let mut again = RegistryManager::new(&registry, 20);
    again.load().unwrap();
    again.release();
}

#[test]
fn test_save_persists_and_releases() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.xlsx");
    make_registry(&registry, 1, 1, &["张三"]);

    let mut manager = RegistryManager::new(&registry, 20);
    manager.load().unwrap();
    manager.validate_format().unwrap();
    manager.create_backup().unwrap();
    let column = manager.find_or_create_assignment_column(1).unwrap();
    let row = manager.find_row("张三").unwrap();
    manager.write_grade(row, column, "及格").unwrap();
    manager.save().unwrap();

    // 保存后可以重新加载并读到写入的值
    let book = umya_spreadsheet::reader::xlsx::read(&registry).unwrap();
    let sheet = book.get_sheet(&0).unwrap();
    assert_eq!(sheet.get_value((column, row)), "及格");

    let mut again = RegistryManager::new(&registry, 20);
    again.load().unwrap();
    again.release();
}
