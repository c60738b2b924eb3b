// Copyright (c) 2020 zenoxygen
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

#[macro_use]
extern crate log;

mod args;

use std::path::PathBuf;

use reaver::error::Result;
use reaver::metainfo::Metainfo;
use reaver::orchestrator;

fn run() -> Result<()> {
    let args = args::parse_args();

    let metainfo = Metainfo::open(&args.torrent)?;
    let out_path: PathBuf = args.dest_dir.join(&metainfo.name);

    info!(
        "downloading {} ({} bytes across {} pieces) to {}",
        metainfo.name,
        metainfo.total_size,
        metainfo.n_pieces(),
        out_path.display()
    );

    orchestrator::download(&metainfo, &out_path)?;

    println!("Saved in {:?}.", out_path);

    Ok(())
}

fn main() {
    pretty_env_logger::init_timed();

    if let Err(error) = run() {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }

    std::process::exit(0);
}
