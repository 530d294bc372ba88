//! 一字节帧标签，以及为给定值挑选最窄 id 编码宽度的规则（规范 §3、§4.6、§6）。

use crate::error::VesperError;

/// 八种已定义的头部语法之一。`0x06` 保留未使用；读到它（或其他任何字节）都是解码错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FramingTag {
    Null = 0x00,
    Buffer = 0x01,
    Id8 = 0x02,
    Id16 = 0x03,
    Id24 = 0x04,
    Id32 = 0x05,
    Class = 0x07,
    Serializable = 0x08,
}

impl FramingTag {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// 解析一个标签字节；`0x06` 或任何未定义集合之外的字节都返回
    /// [`VesperError::UnknownTag`]。
    pub fn from_byte(byte: u8) -> Result<Self, VesperError> {
        match byte {
            0x00 => Ok(Self::Null),
            0x01 => Ok(Self::Buffer),
            0x02 => Ok(Self::Id8),
            0x03 => Ok(Self::Id16),
            0x04 => Ok(Self::Id24),
            0x05 => Ok(Self::Id32),
            0x07 => Ok(Self::Class),
            0x08 => Ok(Self::Serializable),
            other => Err(VesperError::UnknownTag { tag: other }),
        }
    }
}

/// 为 `id` 挑选最窄的携带 id 的标签：255 以内用 ID8，65535 以内用 ID16，
/// 16777215 以内用 ID24，再大则用 ID32。id 按构造即非负（见 [`crate::typeid`]），
/// 因此这里的 ID32 分支只会因 id 超出 24 位而触达，不会经由负值触达。
pub fn select_id_tag(id: u32) -> FramingTag {
    if id <= 0xFF {
        FramingTag::Id8
    } else if id <= 0xFFFF {
        FramingTag::Id16
    } else if id <= 0x00FF_FFFF {
        FramingTag::Id24
    } else {
        FramingTag::Id32
    }
}

/// 一个标签所隐含的 id 编码字节宽度，供测试中按字节核算长度使用。
pub fn id_width(tag: FramingTag) -> Option<usize> {
    match tag {
        FramingTag::Id8 => Some(1),
        FramingTag::Id16 => Some(2),
        FramingTag::Id24 => Some(3),
        FramingTag::Id32 => Some(4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_thresholds_match_spec() {
        assert_eq!(select_id_tag(1), FramingTag::Id8);
        assert_eq!(select_id_tag(255), FramingTag::Id8);
        assert_eq!(select_id_tag(256), FramingTag::Id16);
        assert_eq!(select_id_tag(65_535), FramingTag::Id16);
        assert_eq!(select_id_tag(65_536), FramingTag::Id24);
        assert_eq!(select_id_tag(16_777_215), FramingTag::Id24);
        assert_eq!(select_id_tag(16_777_216), FramingTag::Id32);
        assert_eq!(select_id_tag(1_000_000), FramingTag::Id24);
    }

    #[test]
    fn unused_tag_byte_is_rejected() {
        assert!(matches!(
            FramingTag::from_byte(0x06),
            Err(VesperError::UnknownTag { tag: 0x06 })
        ));
    }
}
