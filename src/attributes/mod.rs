pub mod led_attrs;
pub mod vfs;
pub use led_attrs::{LED_KOBJECT_DIR, MODE_ATTR, PERIOD_ATTR, group_name, led_group};
pub use vfs::{Attribute, AttributeGroup, AttributeOps, GroupHandle, SYSFS_ROOT, VirtualFs};
