//! Assembles small binary soundfonts in memory for tests.

use byteorder::{LittleEndian, WriteBytesExt};

use super::generators::id;

/// Generator amount for a key or velocity range.
pub fn range(low: u8, high: u8) -> i16 {
    i16::from_le_bytes([low, high])
}

pub type Zone = Vec<(u16, i16)>;

struct PresetDef {
    name: String,
    bank: u16,
    program: u16,
    zones: Vec<Zone>,
}

struct InstrumentDef {
    name: String,
    zones: Vec<Zone>,
}

struct SampleDef {
    name: String,
    frames: Vec<i16>,
    loop_points: (u32, u32),
    sample_rate: u32,
    pitch: u8,
    sample_type: u16,
}

pub struct Sf2Builder {
    name: String,
    presets: Vec<PresetDef>,
    instruments: Vec<InstrumentDef>,
    samples: Vec<SampleDef>,
}

fn name20(buf: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; 20];
    let bytes = name.as_bytes();
    let len = bytes.len().min(19);
    field[..len].copy_from_slice(&bytes[..len]);
    buf.extend_from_slice(&field);
}

fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 9);
    out.extend_from_slice(id);
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let mut data = kind.to_vec();
    for child in children {
        data.extend_from_slice(child);
    }
    chunk(b"LIST", &data)
}

/// bag + generator records for a list of zones; returns (bags, gens).
fn zones_to_records(zones_per_owner: &[&[Zone]]) -> (Vec<u8>, Vec<u8>) {
    let mut bags = Vec::new();
    let mut gens = Vec::new();
    let mut gen_index = 0u16;
    for zones in zones_per_owner {
        for zone in zones.iter() {
            bags.write_u16::<LittleEndian>(gen_index).unwrap();
            bags.write_u16::<LittleEndian>(0).unwrap();
            for (oper, amount) in zone {
                gens.write_u16::<LittleEndian>(*oper).unwrap();
                gens.write_i16::<LittleEndian>(*amount).unwrap();
                gen_index += 1;
            }
        }
    }
    bags.write_u16::<LittleEndian>(gen_index).unwrap();
    bags.write_u16::<LittleEndian>(0).unwrap();
    gens.extend_from_slice(&[0u8; 4]);
    (bags, gens)
}

impl Sf2Builder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            presets: Vec::new(),
            instruments: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Add a mono PCM sample; loop points are relative to the sample start.
    pub fn sample(&mut self, name: &str, frames: Vec<i16>, loop_points: (u32, u32), pitch: u8) -> i16 {
        self.sample_with_type(name, frames, loop_points, pitch, 1)
    }

    pub fn sample_with_type(
        &mut self,
        name: &str,
        frames: Vec<i16>,
        loop_points: (u32, u32),
        pitch: u8,
        sample_type: u16,
    ) -> i16 {
        self.samples.push(SampleDef {
            name: name.to_string(),
            frames,
            loop_points,
            sample_rate: 44100,
            pitch,
            sample_type,
        });
        (self.samples.len() - 1) as i16
    }

    pub fn instrument(&mut self, name: &str, zones: Vec<Zone>) -> i16 {
        self.instruments.push(InstrumentDef {
            name: name.to_string(),
            zones,
        });
        (self.instruments.len() - 1) as i16
    }

    pub fn preset(&mut self, name: &str, bank: u16, program: u16, zones: Vec<Zone>) -> &mut Self {
        self.presets.push(PresetDef {
            name: name.to_string(),
            bank,
            program,
            zones,
        });
        self
    }

    /// A preset with one zone pointing at `instrument`.
    pub fn simple_preset(&mut self, name: &str, program: u16, instrument: i16) -> &mut Self {
        self.preset(name, 0, program, vec![vec![(id::INSTRUMENT, instrument)]])
    }

    pub fn build(&self) -> Vec<u8> {
        // sdta
        let mut smpl = Vec::new();
        let mut shdr = Vec::new();
        let mut position = 0u32;
        for sample in &self.samples {
            let start = position;
            for frame in &sample.frames {
                smpl.write_i16::<LittleEndian>(*frame).unwrap();
            }
            smpl.extend_from_slice(&[0u8; 92]);
            position += sample.frames.len() as u32 + 46;

            name20(&mut shdr, &sample.name);
            shdr.write_u32::<LittleEndian>(start).unwrap();
            shdr.write_u32::<LittleEndian>(start + sample.frames.len() as u32).unwrap();
            shdr.write_u32::<LittleEndian>(start + sample.loop_points.0).unwrap();
            shdr.write_u32::<LittleEndian>(start + sample.loop_points.1).unwrap();
            shdr.write_u32::<LittleEndian>(sample.sample_rate).unwrap();
            shdr.push(sample.pitch);
            shdr.push(0);
            shdr.write_u16::<LittleEndian>(0).unwrap();
            shdr.write_u16::<LittleEndian>(sample.sample_type).unwrap();
        }
        name20(&mut shdr, "EOS");
        shdr.extend_from_slice(&[0u8; 26]);

        // presets
        let mut phdr = Vec::new();
        let mut bag_index = 0u16;
        for preset in &self.presets {
            name20(&mut phdr, &preset.name);
            phdr.write_u16::<LittleEndian>(preset.program).unwrap();
            phdr.write_u16::<LittleEndian>(preset.bank).unwrap();
            phdr.write_u16::<LittleEndian>(bag_index).unwrap();
            phdr.extend_from_slice(&[0u8; 12]);
            bag_index += preset.zones.len() as u16;
        }
        name20(&mut phdr, "EOP");
        phdr.extend_from_slice(&[0u8; 4]);
        phdr.write_u16::<LittleEndian>(bag_index).unwrap();
        phdr.extend_from_slice(&[0u8; 12]);
        let preset_zones: Vec<&[Zone]> = self.presets.iter().map(|p| p.zones.as_slice()).collect();
        let (pbag, pgen) = zones_to_records(&preset_zones);

        // instruments
        let mut inst = Vec::new();
        let mut bag_index = 0u16;
        for instrument in &self.instruments {
            name20(&mut inst, &instrument.name);
            inst.write_u16::<LittleEndian>(bag_index).unwrap();
            bag_index += instrument.zones.len() as u16;
        }
        name20(&mut inst, "EOI");
        inst.write_u16::<LittleEndian>(bag_index).unwrap();
        let instrument_zones: Vec<&[Zone]> =
            self.instruments.iter().map(|i| i.zones.as_slice()).collect();
        let (ibag, igen) = zones_to_records(&instrument_zones);

        let mut inam = self.name.as_bytes().to_vec();
        inam.push(0);

        let body = [
            list(b"INFO", &[chunk(b"ifil", &[2, 0, 1, 0]), chunk(b"INAM", &inam)]),
            list(b"sdta", &[chunk(b"smpl", &smpl)]),
            list(
                b"pdta",
                &[
                    chunk(b"phdr", &phdr),
                    chunk(b"pbag", &pbag),
                    chunk(b"pmod", &[0u8; 10]),
                    chunk(b"pgen", &pgen),
                    chunk(b"inst", &inst),
                    chunk(b"ibag", &ibag),
                    chunk(b"imod", &[0u8; 10]),
                    chunk(b"igen", &igen),
                    chunk(b"shdr", &shdr),
                ],
            ),
        ]
        .concat();

        let mut data = b"sfbk".to_vec();
        data.extend_from_slice(&body);
        chunk(b"RIFF", &data)
    }
}
