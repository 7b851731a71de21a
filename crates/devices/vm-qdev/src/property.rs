//! 节点属性
//!
//! 只暴露设备组合层自身需要的几个属性：
//!
//! | 节点 | 属性 | 类型 | 读写 |
//! |---|---|---|---|
//! | 设备 | `realized` | bool | 读写 |
//! | 设备 | `type` | str | 只读 |
//! | 总线 | `realized` | bool | 读写 |
//! | 总线 | `type` | str | 只读 |
//! | 总线 | `accepted-device-types` | str 列表 | 只读 |
//! | 总线 | `hotplug-handler` | 链接 | 读写，写入时校验 |

use crate::error::{QdevError, QdevResult};
use crate::tree::{DeviceTree, NodeId};
use serde::Serialize;

pub const PROP_REALIZED: &str = "realized";
pub const PROP_TYPE: &str = "type";
pub const PROP_ACCEPTED_DEVICE_TYPES: &str = "accepted-device-types";
pub const PROP_HOTPLUG_HANDLER: &str = "hotplug-handler";

/// 属性值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Str(String),
    StrList(Vec<String>),
    /// 指向另一个节点的弱链接
    Link(Option<NodeId>),
}

impl PropertyValue {
    fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Str(_) => PropertyKind::Str,
            PropertyValue::StrList(_) => PropertyKind::StrList,
            PropertyValue::Link(_) => PropertyKind::Link,
        }
    }
}

/// 属性类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyKind {
    Bool,
    Str,
    StrList,
    Link,
}

/// 属性描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyInfo {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub read_only: bool,
}

const DEVICE_PROPERTIES: &[PropertyInfo] = &[
    PropertyInfo {
        name: PROP_REALIZED,
        kind: PropertyKind::Bool,
        read_only: false,
    },
    PropertyInfo {
        name: PROP_TYPE,
        kind: PropertyKind::Str,
        read_only: true,
    },
];

const BUS_PROPERTIES: &[PropertyInfo] = &[
    PropertyInfo {
        name: PROP_REALIZED,
        kind: PropertyKind::Bool,
        read_only: false,
    },
    PropertyInfo {
        name: PROP_TYPE,
        kind: PropertyKind::Str,
        read_only: true,
    },
    PropertyInfo {
        name: PROP_ACCEPTED_DEVICE_TYPES,
        kind: PropertyKind::StrList,
        read_only: true,
    },
    PropertyInfo {
        name: PROP_HOTPLUG_HANDLER,
        kind: PropertyKind::Link,
        read_only: false,
    },
];

impl DeviceTree {
    /// 列出节点的全部属性
    pub fn property_list(&self, node: NodeId) -> QdevResult<&'static [PropertyInfo]> {
        if !self.contains(node) {
            return Err(QdevError::NotFound(node.to_string()));
        }
        Ok(match node {
            NodeId::Device(_) => DEVICE_PROPERTIES,
            NodeId::Bus(_) => BUS_PROPERTIES,
        })
    }

    fn property_info(&self, node: NodeId, name: &str) -> QdevResult<&'static PropertyInfo> {
        self.property_list(node)?
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| QdevError::PropertyNotFound {
                node: self.node_label(node),
                name: name.to_string(),
            })
    }

    /// 读取属性
    pub fn property_get(&self, node: NodeId, name: &str) -> QdevResult<PropertyValue> {
        let info = self.property_info(node, name)?;
        let value = match (node, info.name) {
            (NodeId::Device(dev), PROP_REALIZED) => PropertyValue::Bool(self.device(dev)?.is_realized()),
            (NodeId::Bus(bus), PROP_REALIZED) => PropertyValue::Bool(self.bus(bus)?.is_realized()),
            (_, PROP_TYPE) => PropertyValue::Str(self.type_name_of(node)?.to_string()),
            (NodeId::Bus(bus), PROP_ACCEPTED_DEVICE_TYPES) => {
                PropertyValue::StrList(self.bus(bus)?.accepted_device_types().to_vec())
            }
            (NodeId::Bus(bus), PROP_HOTPLUG_HANDLER) => {
                PropertyValue::Link(self.bus_hotplug_handler(bus)?)
            }
            _ => {
                return Err(QdevError::PropertyNotFound {
                    node: self.node_label(node),
                    name: name.to_string(),
                });
            }
        };
        Ok(value)
    }

    /// 写入属性
    pub fn property_set(&mut self, node: NodeId, name: &str, value: PropertyValue) -> QdevResult<()> {
        let info = self.property_info(node, name)?;
        if info.read_only {
            return Err(QdevError::ReadOnlyProperty {
                node: self.node_label(node),
                name: name.to_string(),
            });
        }
        if value.kind() != info.kind {
            return Err(QdevError::InvalidPropertyValue {
                name: name.to_string(),
                message: format!("expected {:?}, got {:?}", info.kind, value.kind()),
            });
        }

        match (node, value) {
            (NodeId::Device(dev), PropertyValue::Bool(realized)) => {
                self.set_device_realized(dev, realized)
            }
            (NodeId::Bus(bus), PropertyValue::Bool(realized)) => self.set_bus_realized(bus, realized),
            (NodeId::Bus(bus), PropertyValue::Link(handler)) => {
                self.set_bus_hotplug_handler(bus, handler)
            }
            _ => Err(QdevError::PropertyNotFound {
                node: self.node_label(node),
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QdevConfig;
    use crate::hotplug::HotplugHandlerClass;
    use crate::types::TypeInfo;

    fn tree() -> DeviceTree {
        let mut tree = DeviceTree::new(&QdevConfig::default()).unwrap();
        tree.register_type(
            TypeInfo::bus("scsi")
                .device_type("scsi-device")
                .interface(HotplugHandlerClass::new().with_unplug(|_, _, _| Ok(()))),
        )
        .unwrap();
        tree.register_type(TypeInfo::device("scsi-device")).unwrap();
        tree
    }

    #[test]
    fn test_bus_properties() {
        let mut tree = tree();
        let bus = tree.create_bus("scsi", None, None).unwrap();
        let node = NodeId::Bus(bus);

        assert_eq!(tree.property_list(node).unwrap().len(), 4);
        assert_eq!(
            tree.property_get(node, PROP_ACCEPTED_DEVICE_TYPES).unwrap(),
            PropertyValue::StrList(vec!["scsi-device".to_string()])
        );
        assert_eq!(
            tree.property_get(node, PROP_HOTPLUG_HANDLER).unwrap(),
            PropertyValue::Link(None)
        );

        tree.property_set(node, PROP_HOTPLUG_HANDLER, PropertyValue::Link(Some(node)))
            .unwrap();
        assert_eq!(
            tree.property_get(node, PROP_HOTPLUG_HANDLER).unwrap(),
            PropertyValue::Link(Some(node))
        );
        assert!(tree.is_bus_hotpluggable(bus).unwrap());
    }

    #[test]
    fn test_device_realized_property() {
        let mut tree = tree();
        let dev = tree.create_device("scsi-device", Some("sd0")).unwrap();
        let node = NodeId::Device(dev);

        tree.property_set(node, PROP_REALIZED, PropertyValue::Bool(true)).unwrap();
        assert_eq!(tree.property_get(node, PROP_REALIZED).unwrap(), PropertyValue::Bool(true));
        assert_eq!(
            tree.property_get(node, PROP_TYPE).unwrap(),
            PropertyValue::Str("scsi-device".to_string())
        );
    }

    #[test]
    fn test_property_validation() {
        let mut tree = tree();
        let dev = tree.create_device("scsi-device", Some("sd0")).unwrap();
        let node = NodeId::Device(dev);

        assert!(matches!(
            tree.property_get(node, PROP_HOTPLUG_HANDLER),
            Err(QdevError::PropertyNotFound { .. })
        ));
        assert!(matches!(
            tree.property_set(node, PROP_TYPE, PropertyValue::Str("x".to_string())),
            Err(QdevError::ReadOnlyProperty { .. })
        ));
        assert!(matches!(
            tree.property_set(node, PROP_REALIZED, PropertyValue::Str("yes".to_string())),
            Err(QdevError::InvalidPropertyValue { .. })
        ));

        // 链接目标必须实现热插拔接口
        let bus = tree.create_bus("scsi", None, None).unwrap();
        assert!(matches!(
            tree.property_set(bus.into(), PROP_HOTPLUG_HANDLER, PropertyValue::Link(Some(node))),
            Err(QdevError::MissingInterface { .. })
        ));
    }
}
