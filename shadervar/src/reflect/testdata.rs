//! Byte-level bytecode fixtures for reflection tests

use super::container::DXBC_MAGIC;

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Builds a DXBC container from chunks
#[derive(Default)]
pub struct DxbcBuilder {
    chunks: Vec<([u8; 4], Vec<u8>)>,
}

impl DxbcBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, fourcc: [u8; 4], data: Vec<u8>) -> Self {
        self.chunks.push((fourcc, data));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&DXBC_MAGIC);
        out.extend_from_slice(&[0; 16]);
        push_u32(&mut out, 1);
        push_u32(&mut out, 0);
        push_u32(&mut out, self.chunks.len() as u32);

        let table = out.len();
        out.resize(table + self.chunks.len() * 4, 0);

        for (i, (fourcc, data)) in self.chunks.iter().enumerate() {
            let offset = out.len() as u32;
            put_u32(&mut out, table + i * 4, offset);
            out.extend_from_slice(fourcc);
            push_u32(&mut out, data.len() as u32);
            out.extend_from_slice(data);
        }

        let total = out.len() as u32;
        put_u32(&mut out, 24, total);
        out
    }
}

/// Serializes STAT dwords
pub fn stat_chunk(dwords: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for &dword in dwords {
        push_u32(&mut out, dword);
    }
    out
}

/// Builds RDEF chunk data
pub struct RdefBuilder {
    target: u32,
    cbuffers: Vec<(String, u32, Vec<(String, u32, u32)>)>,
    bindings: Vec<(String, u32, u32)>,
}

impl RdefBuilder {
    pub fn pixel(major: u32, minor: u32) -> Self {
        Self::with_program_type(0xFFFF, major, minor)
    }

    pub fn vertex(major: u32, minor: u32) -> Self {
        Self::with_program_type(0xFFFE, major, minor)
    }

    fn with_program_type(program: u32, major: u32, minor: u32) -> Self {
        RdefBuilder {
            target: (program << 16) | (major << 8) | minor,
            cbuffers: Vec::new(),
            bindings: Vec::new(),
        }
    }

    fn major(&self) -> u32 {
        (self.target >> 8) & 0xFF
    }

    /// Adds a constant buffer with `(name, start_offset, size)` variables.
    pub fn cbuffer(mut self, name: &str, size: u32, variables: &[(&str, u32, u32)]) -> Self {
        self.cbuffers.push((
            name.to_string(),
            size,
            variables.iter().map(|(n, start, size)| (n.to_string(), *start, *size)).collect(),
        ));
        self
    }

    /// Adds a bound resource of type `kind` (0 cbuffer, 2 texture, 3 sampler).
    pub fn binding(mut self, name: &str, kind: u32, bind_point: u32) -> Self {
        self.bindings.push((name.to_string(), kind, bind_point));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let sm5 = self.major() >= 5;
        let sm51 = self.major() > 5 || (self.major() == 5 && (self.target & 0xFF) >= 1);
        let header_size = if sm5 { 60 } else { 28 };
        let variable_size = if sm5 { 40 } else { 24 };
        let binding_size = if sm51 { 40 } else { 32 };

        let cbuffer_offset = header_size;
        let variables_offset = cbuffer_offset + self.cbuffers.len() * 24;
        let variable_total: usize = self.cbuffers.iter().map(|(_, _, vars)| vars.len()).sum();
        let binding_offset = variables_offset + variable_total * variable_size;
        let strings_offset = binding_offset + self.bindings.len() * binding_size;

        let mut out = vec![0u8; strings_offset];
        let mut strings = Vec::new();
        let mut add_string = |s: &str| -> u32 {
            let offset = (strings_offset + strings.len()) as u32;
            strings.extend_from_slice(s.as_bytes());
            strings.push(0);
            offset
        };

        put_u32(&mut out, 0, self.cbuffers.len() as u32);
        put_u32(&mut out, 4, cbuffer_offset as u32);
        put_u32(&mut out, 8, self.bindings.len() as u32);
        put_u32(&mut out, 12, binding_offset as u32);
        put_u32(&mut out, 16, self.target);
        if sm5 {
            out[28..32].copy_from_slice(b"RD11");
        }

        let mut next_variable = variables_offset;
        for (i, (name, size, variables)) in self.cbuffers.iter().enumerate() {
            let base = cbuffer_offset + i * 24;
            put_u32(&mut out, base, add_string(name));
            put_u32(&mut out, base + 4, variables.len() as u32);
            put_u32(&mut out, base + 8, next_variable as u32);
            put_u32(&mut out, base + 12, *size);

            for (var_name, start, var_size) in variables {
                put_u32(&mut out, next_variable, add_string(var_name));
                put_u32(&mut out, next_variable + 4, *start);
                put_u32(&mut out, next_variable + 8, *var_size);
                next_variable += variable_size;
            }
        }

        for (i, (name, kind, bind_point)) in self.bindings.iter().enumerate() {
            let base = binding_offset + i * binding_size;
            put_u32(&mut out, base, add_string(name));
            put_u32(&mut out, base + 4, *kind);
            put_u32(&mut out, base + 20, *bind_point);
            put_u32(&mut out, base + 24, 1);
        }

        out.extend_from_slice(&strings);
        out
    }
}

/// A constant table entry for [`CtabBuilder`]
pub struct CtabEntry {
    name: String,
    register_set: u16,
    register_index: u16,
    register_count: u16,
    class: u16,
    ty: u16,
    rows: u16,
    columns: u16,
}

impl CtabEntry {
    /// Float4 register constant, defaulting to a `float4` vector.
    pub fn float(name: &str, register_index: u16, register_count: u16) -> Self {
        CtabEntry {
            name: name.to_string(),
            register_set: 2,
            register_index,
            register_count,
            class: 1,
            ty: 3,
            rows: 1,
            columns: 4,
        }
    }

    /// Sampler register constant.
    pub fn sampler(name: &str, register_index: u16) -> Self {
        CtabEntry {
            name: name.to_string(),
            register_set: 3,
            register_index,
            register_count: 1,
            class: 4,
            ty: 12,
            rows: 1,
            columns: 1,
        }
    }

    pub fn vector(mut self, rows: u16, columns: u16) -> Self {
        self.class = 1;
        self.rows = rows;
        self.columns = columns;
        self
    }

    pub fn scalar(mut self) -> Self {
        self.class = 0;
        self.rows = 1;
        self.columns = 1;
        self
    }

    pub fn matrix(mut self, rows: u16, columns: u16) -> Self {
        self.class = 2;
        self.rows = rows;
        self.columns = columns;
        self
    }

    /// Overrides the component type (3 = float, 2 = int, 1 = bool).
    pub fn ty(mut self, ty: u16) -> Self {
        self.ty = ty;
        self
    }
}

/// Builds legacy (shader model 2/3) bytecode carrying a constant table
pub struct CtabBuilder {
    version: u32,
    leading_comments: Vec<Vec<u8>>,
    constants: Vec<CtabEntry>,
}

impl CtabBuilder {
    pub fn pixel() -> Self {
        CtabBuilder {
            version: 0xFFFF_0201,
            leading_comments: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn vertex() -> Self {
        CtabBuilder {
            version: 0xFFFE_0200,
            leading_comments: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Adds a comment block placed before the constant table (padded to dwords).
    pub fn leading_comment(mut self, data: &[u8]) -> Self {
        self.leading_comments.push(data.to_vec());
        self
    }

    pub fn constant(mut self, entry: CtabEntry) -> Self {
        self.constants.push(entry);
        self
    }

    fn table(&self) -> Vec<u8> {
        const HEADER: usize = 28;
        const INFO: usize = 20;
        const TYPE: usize = 16;

        let info_offset = HEADER;
        let types_offset = info_offset + self.constants.len() * INFO;
        let strings_offset = types_offset + self.constants.len() * TYPE;

        let mut out = vec![0u8; strings_offset];
        let mut strings = Vec::new();
        let mut add_string = |s: &str| -> u32 {
            let offset = (strings_offset + strings.len()) as u32;
            strings.extend_from_slice(s.as_bytes());
            strings.push(0);
            offset
        };

        put_u32(&mut out, 0, HEADER as u32);
        put_u32(&mut out, 4, add_string("shadervar test fixture"));
        put_u32(&mut out, 8, self.version);
        put_u32(&mut out, 12, self.constants.len() as u32);
        put_u32(&mut out, 16, info_offset as u32);
        put_u32(&mut out, 24, add_string("ps_2_b"));

        for (i, c) in self.constants.iter().enumerate() {
            let info = info_offset + i * INFO;
            let type_info = types_offset + i * TYPE;

            put_u32(&mut out, info, add_string(&c.name));
            out[info + 4..info + 6].copy_from_slice(&c.register_set.to_le_bytes());
            out[info + 6..info + 8].copy_from_slice(&c.register_index.to_le_bytes());
            out[info + 8..info + 10].copy_from_slice(&c.register_count.to_le_bytes());
            put_u32(&mut out, info + 12, type_info as u32);

            let mut ty = Vec::with_capacity(TYPE);
            for value in [c.class, c.ty, c.rows, c.columns, 1, 0] {
                push_u16(&mut ty, value);
            }
            push_u32(&mut ty, 0);
            out[type_info..type_info + TYPE].copy_from_slice(&ty);
        }

        out.extend_from_slice(&strings);
        out
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, self.version);

        let mut comments: Vec<Vec<u8>> = self.leading_comments.clone();
        let mut ctab = b"CTAB".to_vec();
        ctab.extend_from_slice(&self.table());
        comments.push(ctab);

        for mut comment in comments {
            comment.resize(comment.len().next_multiple_of(4), 0);
            let dwords = (comment.len() / 4) as u32;
            push_u32(&mut out, (dwords << 16) | 0xFFFE);
            out.extend_from_slice(&comment);
        }

        // mov oC0, c0 followed by the end token
        push_u32(&mut out, 0x0000_0001);
        push_u32(&mut out, 0x0000_FFFF);
        out
    }
}
