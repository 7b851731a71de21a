//! # vm-qdev - 设备组合与热插拔层
//!
//! 维护由总线与设备交替组成的设备树，负责设备的激活/停用、热插拔协议的分发，
//! 以及插槽查询（描述每条总线上还能插入什么设备）。
//!
//! ## 模块组织
//!
//! ```text
//! vm-qdev
//! ├── value_set   # 插槽选项取值集合（标量 / 区间 / 列表）
//! ├── interface   # 能力接口分发
//! ├── types       # 类型注册表与总线自动编号
//! ├── tree        # 设备树：创建、挂接、销毁、遍历
//! ├── lifecycle   # realize / unrealize 状态机
//! ├── reset       # 复位注册表与系统复位
//! ├── hotplug     # 四阶段热插拔协议与 device_add / device_del
//! ├── slots       # 插槽描述、合并与查询
//! ├── property    # 节点属性
//! └── config      # 配置（TOML / JSON）
//! ```
//!
//! ## 使用方式
//!
//! ```rust,ignore
//! use vm_qdev::{DeviceTree, QdevConfig, TypeInfo};
//!
//! let mut tree = DeviceTree::new(&QdevConfig::default())?;
//! tree.register_type(TypeInfo::bus("IDE").device_type("ide-device").max_dev(2))?;
//! tree.register_type(TypeInfo::device("ide-hd"))?;
//!
//! let bus = tree.create_bus("IDE", None, None)?;
//! let disk = tree.device_add("ide-hd", Some("disk0"), bus)?;
//! let slots = tree.query_slots(bus)?;
//! ```
//!
//! 整棵树没有内部锁，多线程访问请使用 [`SharedDeviceTree`]。

pub mod config;
pub mod error;
pub mod hotplug;
pub mod interface;
pub mod lifecycle;
pub mod property;
pub mod reset;
pub mod slots;
pub mod tree;
pub mod types;
pub mod value_set;

pub use config::{ConfigError, QdevConfig};
pub use error::{LifecyclePhase, QdevError, QdevResult};
pub use hotplug::{HotplugFn, HotplugHandlerClass, HotplugPhase, UnplugOutcome};
pub use interface::{Interface, InterfaceTable};
pub use property::{PropertyInfo, PropertyKind, PropertyValue};
pub use reset::{ResetRegistry, SimpleResetRegistry};
pub use slots::{
    Combinability, DeviceSlotInfo, SlotOption, add_slot, can_combine, combine,
    options_can_be_combined, try_combine,
};
pub use tree::{
    Bus, BusChild, BusId, Device, DeviceId, DeviceTree, LifecycleState, NodeId, SharedDeviceTree,
    WalkOrder,
};
pub use types::{TypeInfo, TypeKind, TypeRegistry};
pub use value_set::{SlotValue, ValueSet};
