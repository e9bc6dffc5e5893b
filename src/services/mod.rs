//! 业务能力层
//!
//! 描述"我能做什么"，每个服务只处理单个文件/姓名/名称，
//! 不关心批处理编排。

pub mod assignment_resolver;
pub mod file_validator;
pub mod grade_extractor;
pub mod name_matcher;

pub use assignment_resolver::AssignmentNumberResolver;
pub use file_validator::FileValidator;
pub use grade_extractor::GradeValueExtractor;
pub use name_matcher::NameMatcher;
