//! 小端字节流读取
//!
//! 两种二进制格式共用的顺序读取器。只向前消费，不回溯。

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use glam::{Vec2, Vec3, Vec4};

use crate::{MmdError, Result};

/// 顺序字节流
pub struct ByteStream<R: Read> {
    inner: R,
}

impl<R: Read> ByteStream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.inner.read_i8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.inner.read_i16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.inner.read_f32::<LittleEndian>()?)
    }

    pub fn read_vec2(&mut self) -> Result<Vec2> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec4(&mut self) -> Result<Vec4> {
        Ok(Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// 读取定长字节数组
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }

    /// 按声明宽度读取索引值（1/2/4 字节）
    pub fn read_index(&mut self, size: u8, unsigned: bool) -> Result<i32> {
        let value = match (size, unsigned) {
            (1, false) => self.read_i8()? as i32,
            (1, true) => self.read_u8()? as i32,
            (2, false) => self.read_i16()? as i32,
            (2, true) => self.read_u16()? as i32,
            (4, _) => self.read_i32()?,
            _ => {
                return Err(MmdError::Format(format!("invalid index size: {}", size)));
            }
        };
        Ok(value)
    }

    /// 剩余字节数（读尽流）
    pub fn read_rest(&mut self) -> Result<usize> {
        let mut rest = Vec::new();
        self.inner.read_to_end(&mut rest)?;
        Ok(rest.len())
    }
}

/// 在首个 null 字节处截断
pub fn crop_null(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// 判断错误是否为流提前结束（用于可容忍的截断恢复）
pub fn is_unexpected_eof(err: &MmdError) -> bool {
    matches!(err, MmdError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
}

#[cfg(test)]
pub(crate) mod testutil {
    //! 测试用字节缓冲构建工具

    #[derive(Default)]
    pub struct Buf(pub Vec<u8>);

    impl Buf {
        pub fn new() -> Self {
            Self(Vec::new())
        }

        pub fn u8(&mut self, v: u8) -> &mut Self {
            self.0.push(v);
            self
        }

        pub fn i8(&mut self, v: i8) -> &mut Self {
            self.0.push(v as u8);
            self
        }

        pub fn u16(&mut self, v: u16) -> &mut Self {
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn u32(&mut self, v: u32) -> &mut Self {
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn i32(&mut self, v: i32) -> &mut Self {
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn f32(&mut self, v: f32) -> &mut Self {
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn vec3(&mut self, x: f32, y: f32, z: f32) -> &mut Self {
            self.f32(x).f32(y).f32(z)
        }

        pub fn vec4(&mut self, x: f32, y: f32, z: f32, w: f32) -> &mut Self {
            self.f32(x).f32(y).f32(z).f32(w)
        }

        pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
            self.0.extend_from_slice(v);
            self
        }

        /// 零填充到定长的字节串
        pub fn padded(&mut self, v: &[u8], len: usize) -> &mut Self {
            assert!(v.len() <= len);
            self.0.extend_from_slice(v);
            self.0.extend(std::iter::repeat(0u8).take(len - v.len()));
            self
        }

        /// PMX 长度前缀字符串（UTF-8 编码）
        pub fn pmx_str(&mut self, s: &str) -> &mut Self {
            self.u32(s.len() as u32).bytes(s.as_bytes())
        }
    }

    #[test]
    fn buf_little_endian() {
        let mut b = Buf::new();
        b.u32(0x01020304);
        assert_eq!(b.0, vec![0x04, 0x03, 0x02, 0x01]);
    }
}
