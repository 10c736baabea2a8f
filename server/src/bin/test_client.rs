//! Headless probe client: joins, votes to start, then claims every prime
//! on the board it receives. Handy for poking a running server without the
//! graphical client.
//!
//! Usage: `test_client [addr] [name]` (defaults `127.0.0.1:5555`, `probe`).

use shared::{encode_frame, is_prime, Board, FrameHeader, MsgType, HEADER_LEN};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

async fn read_frame(stream: &mut TcpStream) -> Result<(u8, String), Box<dyn std::error::Error>> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let header = FrameHeader::parse(&header)?;
    let mut body = vec![0u8; header.length as usize];
    stream.read_exact(&mut body).await?;
    Ok((header.tag, String::from_utf8(body)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:5555".to_string());
    let name = args.next().unwrap_or_else(|| "probe".to_string());

    let mut stream = TcpStream::connect(&addr).await?;
    println!("Connected to {addr}");

    stream.write_all(&encode_frame(MsgType::Join, &name)).await?;
    stream.write_all(&encode_frame(MsgType::Start, "")).await?;

    loop {
        let (tag, payload) = match timeout(Duration::from_secs(150), read_frame(&mut stream)).await
        {
            Ok(frame) => frame?,
            Err(_) => {
                println!("No frame within 150s, giving up");
                break;
            }
        };

        match MsgType::try_from(tag) {
            Ok(MsgType::StartGame) => {
                println!("Board received, claiming every prime");
                let board: Board = serde_json::from_str(&payload)?;
                for (row, cells) in board.cells().iter().enumerate() {
                    for (col, cell) in cells.iter().enumerate() {
                        if !cell.is_claimed() && is_prime(cell.value()) {
                            stream
                                .write_all(&encode_frame(MsgType::Click, &format!("{row},{col}")))
                                .await?;
                        }
                    }
                }
            }
            Ok(MsgType::GameOver) => {
                println!("GAME_OVER: {payload}");
                stream
                    .write_all(&encode_frame(MsgType::ClientLeft, ""))
                    .await?;
                break;
            }
            Ok(MsgType::ServerBusy) => {
                println!("SERVER_BUSY: {payload}");
                break;
            }
            Ok(msg_type) => println!("{msg_type:?}: {payload}"),
            Err(_) => println!("Unknown frame tag {tag}: {payload}"),
        }
    }

    Ok(())
}
