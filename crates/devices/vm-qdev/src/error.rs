//! 设备组合层错误类型
//!
//! 所有树操作、生命周期转换和热插拔阶段都返回 [`QdevError`]。
//! "处理器不存在" 与 "插槽不可合并" 不是错误，分别是空操作与正常的不合并分支。

use std::fmt;

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// 激活
    Realize,
    /// 停用
    Unrealize,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Realize => write!(f, "realize"),
            LifecyclePhase::Unrealize => write!(f, "unrealize"),
        }
    }
}

/// 设备组合层统一错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QdevError {
    /// realize/unrealize 钩子失败，携带底层原因
    #[error("Failed to {phase} '{node}': {source}")]
    Lifecycle {
        node: String,
        phase: LifecyclePhase,
        #[source]
        source: Box<QdevError>,
    },
    /// 总线已满
    #[error("Bus '{bus}' is full (capacity {capacity})")]
    Capacity { bus: String, capacity: usize },
    /// 在不允许的状态下请求状态转换
    #[error("Invalid state for '{node}': {message}")]
    InvalidState { node: String, message: String },
    /// 节点类型未实现请求的接口
    #[error("Type '{type_name}' does not implement interface '{interface}'")]
    MissingInterface {
        type_name: String,
        interface: &'static str,
    },
    /// 未注册的类型
    #[error("Unknown type: {0}")]
    UnknownType(String),
    /// 类型注册冲突或类型种类不符
    #[error("Invalid type '{name}': {message}")]
    InvalidType { name: String, message: String },
    /// 节点不存在
    #[error("Node not found: {0}")]
    NotFound(String),
    /// 名称冲突
    #[error("Duplicate name: {0}")]
    DuplicateName(String),
    /// 设备类型不被总线接受
    #[error("Bus '{bus}' does not accept device type '{device_type}'")]
    IncompatibleDevice { bus: String, device_type: String },
    /// 总线或设备不支持热插拔
    #[error("'{0}' does not support hotplugging")]
    NotHotpluggable(String),
    /// 默认系统总线永不销毁
    #[error("The main system bus can not be removed")]
    SystemBusRemoval,
    /// 属性不存在
    #[error("Property '{name}' not found on '{node}'")]
    PropertyNotFound { node: String, name: String },
    /// 属性只读
    #[error("Property '{name}' of '{node}' is read-only")]
    ReadOnlyProperty { node: String, name: String },
    /// 属性值类型或内容不合法
    #[error("Invalid value for property '{name}': {message}")]
    InvalidPropertyValue { name: String, message: String },
    /// 配置不合法
    #[error("Configuration error: {0}")]
    Config(String),
    /// 钩子（设备模型）报告的失败
    #[error("{0}")]
    Hook(String),
}

impl QdevError {
    /// 供设备模型钩子构造失败原因
    pub fn hook(message: impl Into<String>) -> Self {
        QdevError::Hook(message.into())
    }

    pub(crate) fn lifecycle(node: impl Into<String>, phase: LifecyclePhase, cause: QdevError) -> Self {
        QdevError::Lifecycle {
            node: node.into(),
            phase,
            source: Box::new(cause),
        }
    }

    /// 剥去 `Lifecycle` 包装，返回最内层的原因
    pub fn root_cause(&self) -> &QdevError {
        match self {
            QdevError::Lifecycle { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// 设备组合层结果类型
pub type QdevResult<T> = Result<T, QdevError>;
