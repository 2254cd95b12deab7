use std::{
    io::{self, BufRead, Read},
    mem,
    sync::mpsc::{self, Receiver, Sender},
};

// Pipelined requests share one reader. Each request gets a `QueuedReader` that
// waits until the previous request's reader is dropped and handed over, so
// the bodies are consumed strictly in order.
pub(crate) enum ReadQueue<R> {
    Head(R),
    Next(Receiver<R>),
}

pub(crate) struct QueuedReader<R>
where
    R: Read + Send,
{
    reader: Option<QueuedReaderInner<R>>,
    next: Sender<R>,
}

enum QueuedReaderInner<R> {
    Current(R),
    Waiting(Receiver<R>),
}

fn handover_failed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "previous request reader was lost")
}

impl<R: Read + Send> ReadQueue<R> {
    pub(crate) fn new(reader: R) -> ReadQueue<R> {
        ReadQueue::Head(reader)
    }

    pub(crate) fn enqueue(&mut self) -> QueuedReader<R> {
        let (tx, rx) = mpsc::channel();

        match mem::replace(self, ReadQueue::Next(rx)) {
            ReadQueue::Head(reader) => QueuedReader {
                reader: Some(QueuedReaderInner::Current(reader)),
                next: tx,
            },
            ReadQueue::Next(previous) => QueuedReader {
                reader: Some(QueuedReaderInner::Waiting(previous)),
                next: tx,
            },
        }
    }
}

impl<R: Read + Send> QueuedReader<R> {
    fn current(&mut self) -> io::Result<&mut R> {
        if let Some(QueuedReaderInner::Waiting(rx)) = &self.reader {
            let reader = rx.recv().map_err(|_| handover_failed())?;
            self.reader = Some(QueuedReaderInner::Current(reader));
        }

        match self.reader {
            Some(QueuedReaderInner::Current(ref mut reader)) => Ok(reader),
            _ => Err(handover_failed()),
        }
    }
}

impl<R: Read + Send> Read for QueuedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.current()?.read(buf)
    }
}

impl<R: BufRead + Send> BufRead for QueuedReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.current()?.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if let Ok(reader) = self.current() {
            reader.consume(amt);
        }
    }
}

impl<R: Read + Send> Drop for QueuedReader<R> {
    // A failed send means the next request is gone with its connection.
    fn drop(&mut self) {
        match self.reader.take() {
            Some(QueuedReaderInner::Current(reader)) => {
                let _ = self.next.send(reader);
            }
            Some(QueuedReaderInner::Waiting(rx)) => {
                if let Ok(reader) = rx.recv() {
                    let _ = self.next.send(reader);
                }
            }
            None => {}
        }
    }
}
