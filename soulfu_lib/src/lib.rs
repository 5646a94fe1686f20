use binrw::{BinReaderExt, Endian};

pub mod ddd;

macro_rules! file_read_impl {
    ($endian:path, $($type_name:path),*) => {
        $(
            impl $type_name {
                pub fn read<R: std::io::Read + std::io::Seek>(reader: &mut R) -> binrw::BinResult<Self> {
                    reader.read_type($endian).map_err(Into::into)
                }

                /// Read from `path` using a fully buffered reader for performance.
                pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> binrw::BinResult<Self> {
                    let path = path.as_ref();
                    let mut reader = std::io::Cursor::new(std::fs::read(path)?);
                    reader.read_type($endian).map_err(Into::into)
                }

                /// Read from `bytes` using a fully buffered reader for performance.
                pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> binrw::BinResult<Self> {
                    Self::read(&mut std::io::Cursor::new(bytes))
                }
            }
        )*
    };
}

file_read_impl!(Endian::Big, ddd::Ddd);

macro_rules! file_write_impl {
    ($endian:path, $($type_name:path),*) => {
        $(
            impl $type_name {
                pub fn write<W: std::io::Write + std::io::Seek>(&self, writer: &mut W) -> binrw::BinResult<()> {
                    <Self as binrw::BinWrite>::write_options(&self, writer, $endian, ())
                }

                /// Write to `path` using a buffered writer for better performance.
                pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> binrw::BinResult<()> {
                    let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
                    self.write(&mut writer)
                }
            }
        )*
    };
}

file_write_impl!(binrw::Endian::Big, ddd::Ddd);
